//! Sentiment classification over collected feed items.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::analysis::{prepare_text, truncate_chars};
use crate::storage::analysis::{AnalysisStore, SentimentAnalysis};
use crate::storage::feed_items::FeedItemStore;
use crate::storage::Pool;

/// Combined text is capped here before classification.
const MAX_TEXT_CHARS: usize = 1000;
const PREVIEW_CHARS: usize = 200;

pub const LABEL_POSITIVE: &str = "positive";
pub const LABEL_NEGATIVE: &str = "negative";
pub const LABEL_NEUTRAL: &str = "neutral";

/// A classification verdict with the full score map behind it.
#[derive(Debug, Clone)]
pub struct Sentiment {
    pub label: String,
    pub confidence: f64,
    pub scores: BTreeMap<String, f64>,
}

/// Classifier seam. The shipped implementation is lexicon-based, heavier
/// models plug in through the same trait.
pub trait SentimentClassifier: Send + Sync {
    fn model_name(&self) -> &str;
    fn classify(&self, text: &str) -> Sentiment;
}

/// Counts polarity-bearing terms from a fixed Spanish/English finance
/// lexicon. Scores are normalized with a unit neutral prior so empty text
/// lands on neutral with full confidence.
pub struct LexiconClassifier {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

const POSITIVE_TERMS: &[&str] = &[
    "sube", "suba", "subida", "crecimiento", "mejora", "record", "superavit",
    "superávit", "gana", "ganancia", "ganancias", "acuerdo", "inversion", "inversión",
    "inversiones", "alza", "repunte", "recuperacion", "recuperación", "beneficio",
    "beneficios", "exito", "éxito", "avanza", "optimismo", "expansion", "expansión",
    "crece", "fortalece", "growth", "rally", "surge", "gains", "profit", "recovery",
];

const NEGATIVE_TERMS: &[&str] = &[
    "baja", "caida", "caída", "cae", "crisis", "inflacion", "inflación", "deficit",
    "déficit", "perdida", "pérdida", "perdidas", "pérdidas", "pierde", "recesion",
    "recesión", "default", "deuda", "desplome", "derrumbe", "riesgo", "ajuste",
    "devaluacion", "devaluación", "desempleo", "quiebra", "pesimismo", "cepo",
    "corralito", "crash", "drop", "decline", "loss", "losses", "selloff",
];

impl LexiconClassifier {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE_TERMS.iter().copied().collect(),
            negative: NEGATIVE_TERMS.iter().copied().collect(),
        }
    }
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentClassifier for LexiconClassifier {
    fn model_name(&self) -> &str {
        "lexicon-es-finance-v1"
    }

    fn classify(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        let mut positive_hits = 0usize;
        let mut negative_hits = 0usize;
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if self.positive.contains(token) {
                positive_hits += 1;
            } else if self.negative.contains(token) {
                negative_hits += 1;
            }
        }

        let denom = (positive_hits + negative_hits + 1) as f64;
        let mut scores = BTreeMap::new();
        scores.insert(LABEL_POSITIVE.to_string(), positive_hits as f64 / denom);
        scores.insert(LABEL_NEGATIVE.to_string(), negative_hits as f64 / denom);
        scores.insert(LABEL_NEUTRAL.to_string(), 1.0 / denom);

        let label = if positive_hits > negative_hits {
            LABEL_POSITIVE
        } else if negative_hits > positive_hits {
            LABEL_NEGATIVE
        } else {
            LABEL_NEUTRAL
        };
        Sentiment {
            label: label.to_string(),
            confidence: scores[label],
            scores,
        }
    }
}

/// What a sentiment pass did, for the CLI report.
#[derive(Debug, Clone)]
pub struct SentimentRunSummary {
    pub examined: usize,
    pub processed: usize,
    pub distribution: BTreeMap<String, usize>,
}

pub struct SentimentAnalysisService<C> {
    items: FeedItemStore,
    analyses: AnalysisStore,
    classifier: C,
}

impl<C: SentimentClassifier> SentimentAnalysisService<C> {
    pub fn new(pool: Pool, classifier: C) -> Self {
        Self {
            items: FeedItemStore::new(pool.clone()),
            analyses: AnalysisStore::new(pool),
            classifier,
        }
    }

    /// Classify stored items, oldest first, persisting one analysis row per
    /// item. Items with no text are passed over.
    pub fn run(&self, limit: Option<usize>) -> Result<SentimentRunSummary> {
        info!("Starting sentiment prediction for stored feed items");
        let feeds = self.items.all(limit)?;
        info!(count = feeds.len(), "Feeds to process");

        let mut summary = SentimentRunSummary {
            examined: feeds.len(),
            processed: 0,
            distribution: BTreeMap::new(),
        };

        for feed in &feeds {
            let text = prepare_text(feed, MAX_TEXT_CHARS);
            if text.is_empty() {
                continue;
            }
            let verdict = self.classifier.classify(&text);

            let doc = SentimentAnalysis {
                feed_id: feed.id,
                model_name: self.classifier.model_name().to_string(),
                sentiment_label: verdict.label.clone(),
                sentiment_confidence: verdict.confidence,
                all_scores: serde_json::json!(verdict.scores),
                text_preview: truncate_chars(&text, PREVIEW_CHARS),
                analysis_date: Utc::now(),
                source: feed.source_url.clone(),
                pub_date: feed.pub_date.clone(),
            };
            if let Err(e) = self.analyses.insert_sentiment(&doc) {
                error!(feed_id = feed.id, "Failed to store sentiment: {:#}", e);
                continue;
            }

            *summary.distribution.entry(verdict.label).or_default() += 1;
            summary.processed += 1;
            if summary.processed % 10 == 0 {
                info!(processed = summary.processed, total = feeds.len(), "Progress");
            }
        }

        info!(
            processed = summary.processed,
            examined = summary.examined,
            "Sentiment prediction finished"
        );
        Ok(summary)
    }
}
