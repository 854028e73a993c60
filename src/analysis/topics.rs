//! Keyphrase extraction over collected feed items.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::analysis::{prepare_text, truncate_chars};
use crate::storage::analysis::{AnalysisStore, Keyphrase, TopicAnalysis};
use crate::storage::feed_items::FeedItemStore;
use crate::storage::Pool;

/// Combined text is capped here before extraction.
const MAX_TEXT_CHARS: usize = 2000;
const PREVIEW_CHARS: usize = 500;
/// Items with less text than this are skipped outright.
const MIN_TEXT_CHARS: usize = 20;

/// Extractor seam, mirrors the classifier seam on the sentiment side.
pub trait KeyphraseExtractor: Send + Sync {
    /// Ranked keyphrases, best first. Lower score means more salient.
    fn extract(&self, text: &str) -> Vec<Keyphrase>;
}

/// Frequency and position based extractor over unigrams and bigrams.
///
/// Terms score `(0.5 + first_position_ratio) / frequency`, a phrase scores
/// the product of its member scores over `1 + phrase_frequency`, so early
/// repeated phrases float to the top and a strong bigram beats the unigrams
/// it is built from. Candidates touching a stopword are never produced and
/// phrases overlapping an already selected one are suppressed.
pub struct StatisticalExtractor {
    stopwords: HashSet<&'static str>,
    top_k: usize,
}

const STOPWORDS: &[&str] = &[
    // Spanish
    "a", "al", "algo", "algunas", "algunos", "ante", "antes", "como", "con", "contra",
    "cual", "cuando", "de", "del", "desde", "donde", "durante", "e", "el", "ella",
    "ellas", "ellos", "en", "entre", "era", "es", "esa", "ese", "eso", "esta", "estas",
    "este", "esto", "estos", "fue", "ha", "hace", "hasta", "hay", "la", "las", "le",
    "les", "lo", "los", "mas", "más", "me", "mi", "muy", "ni", "no", "nos", "o", "otra",
    "otras", "otro", "otros", "para", "pero", "poco", "por", "porque", "que", "qué",
    "quien", "se", "segun", "según", "ser", "si", "sí", "sin", "sobre", "son", "su",
    "sus", "tambien", "también", "tan", "tanto", "tiene", "todo", "todos", "tras", "un",
    "una", "uno", "unos", "y", "ya",
    // English
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will", "with",
];

impl StatisticalExtractor {
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().copied().collect(),
            top_k: 6,
        }
    }
}

impl Default for StatisticalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyphraseExtractor for StatisticalExtractor {
    fn extract(&self, text: &str) -> Vec<Keyphrase> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2 && t.chars().any(|c| c.is_alphabetic()))
            .collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let total = tokens.len() as f64;
        let mut freq: HashMap<&str, usize> = HashMap::new();
        let mut first_pos: HashMap<&str, usize> = HashMap::new();
        for (i, t) in tokens.iter().enumerate() {
            *freq.entry(t).or_default() += 1;
            first_pos.entry(t).or_insert(i);
        }
        let term_score = |t: &str| -> f64 {
            let position_ratio = first_pos[t] as f64 / total;
            (0.5 + position_ratio) / freq[t] as f64
        };

        // Candidate phrases with occurrence counts and first positions.
        let mut candidates: HashMap<String, (f64, usize, usize)> = HashMap::new();
        let mut note = |phrase: String, base_score: f64, pos: usize| {
            let entry = candidates.entry(phrase).or_insert((base_score, 0, pos));
            entry.1 += 1;
        };
        for (i, t) in tokens.iter().enumerate() {
            if self.stopwords.contains(t) {
                continue;
            }
            note(t.to_string(), term_score(t), i);
            if let Some(next) = tokens.get(i + 1) {
                if !self.stopwords.contains(next) {
                    note(format!("{t} {next}"), term_score(t) * term_score(next), i);
                }
            }
        }

        let mut ranked: Vec<(String, f64, usize)> = candidates
            .into_iter()
            .map(|(phrase, (base, count, pos))| (phrase, base / (1 + count) as f64, pos))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));

        let mut selected: Vec<Keyphrase> = Vec::new();
        let mut used_tokens: HashSet<String> = HashSet::new();
        for (phrase, score, _) in ranked {
            if selected.len() >= self.top_k {
                break;
            }
            if phrase.split(' ').any(|t| used_tokens.contains(t)) {
                continue;
            }
            for t in phrase.split(' ') {
                used_tokens.insert(t.to_string());
            }
            selected.push(Keyphrase { phrase, score });
        }
        selected
    }
}

/// What a topic pass did, for the CLI report.
#[derive(Debug, Clone)]
pub struct TopicRunSummary {
    pub examined: usize,
    pub processed: usize,
    pub skipped: usize,
}

pub struct TopicAnalysisService<E> {
    items: FeedItemStore,
    analyses: AnalysisStore,
    extractor: E,
}

impl<E: KeyphraseExtractor> TopicAnalysisService<E> {
    pub fn new(pool: Pool, extractor: E) -> Self {
        Self {
            items: FeedItemStore::new(pool.clone()),
            analyses: AnalysisStore::new(pool),
            extractor,
        }
    }

    /// Extract keyphrases for stored items, oldest first, persisting one
    /// analysis row per item with enough text.
    pub fn run(&self, limit: Option<usize>) -> Result<TopicRunSummary> {
        info!("Starting topic extraction for stored feed items");
        let feeds = self.items.all(limit)?;
        info!(count = feeds.len(), "Feeds to process");

        let mut summary = TopicRunSummary {
            examined: feeds.len(),
            processed: 0,
            skipped: 0,
        };

        for feed in &feeds {
            let text = prepare_text(feed, MAX_TEXT_CHARS);
            let text_len = text.chars().count();
            if text_len < MIN_TEXT_CHARS {
                warn!(feed_id = feed.id, "Skipping feed with insufficient text");
                summary.skipped += 1;
                continue;
            }

            let keyphrases = self.extractor.extract(&text);
            let doc = TopicAnalysis {
                feed_id: feed.id,
                analysis_date: Utc::now(),
                keyphrases,
                text_preview: truncate_chars(&text, PREVIEW_CHARS),
                source: feed.source_url.clone(),
                title: feed.title.clone(),
                processed_text_length: text_len,
            };
            if let Err(e) = self.analyses.insert_topics(&doc) {
                error!(feed_id = feed.id, "Failed to store topics: {:#}", e);
                continue;
            }
            summary.processed += 1;
            if summary.processed % 10 == 0 {
                info!(processed = summary.processed, total = feeds.len(), "Progress");
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            "Topic extraction finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::feed_items::FeedItem;
    use crate::storage::open_pool;

    #[test]
    fn test_extractor_surfaces_repeated_phrase() {
        let ex = StatisticalExtractor::new();
        let text = "El dolar blue subio otra vez. El dolar blue marco un record \
                    mientras el mercado espera definiciones sobre el dolar blue.";
        let phrases = ex.extract(text);
        assert!(!phrases.is_empty());
        assert_eq!(phrases[0].phrase, "dolar blue");
        // Ranked best first, scores ascend.
        for pair in phrases.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
    }

    #[test]
    fn test_extractor_excludes_stopwords_and_caps_count() {
        let ex = StatisticalExtractor::new();
        let text = "La inflacion de alimentos preocupa a los analistas porque la \
                    inflacion de alimentos acumula meses de subas en los precios \
                    de alimentos y bebidas en todo el pais segun el informe";
        let phrases = ex.extract(text);
        assert!(phrases.len() <= 6);
        for p in &phrases {
            for token in p.phrase.split(' ') {
                assert!(!STOPWORDS.contains(&token), "stopword leaked: {}", token);
            }
        }
    }

    #[test]
    fn test_extractor_empty_and_tiny_input() {
        let ex = StatisticalExtractor::new();
        assert!(ex.extract("").is_empty());
        assert!(ex.extract("12 34 !!").is_empty());
    }

    #[test]
    fn test_extractor_suppresses_overlapping_phrases() {
        let ex = StatisticalExtractor::new();
        let text = "dolar blue dolar blue dolar blue cotizacion del dolar";
        let phrases = ex.extract(text);
        let mut seen: HashSet<&str> = HashSet::new();
        for p in &phrases {
            for token in p.phrase.split(' ') {
                assert!(seen.insert(token), "token repeated across phrases: {}", token);
            }
        }
    }

    #[test]
    fn test_service_skips_short_text_and_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("test.db")).unwrap();
        let items = FeedItemStore::new(pool.clone());
        items
            .insert_items(&[
                feed_item(
                    "https://e.com/long",
                    "La inflacion de agosto supero las proyecciones de los analistas del mercado",
                ),
                feed_item("https://e.com/short", "corto"),
            ])
            .unwrap();

        let service = TopicAnalysisService::new(pool.clone(), StatisticalExtractor::new());
        let summary = service.run(None).unwrap();
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);

        let conn = pool.get().unwrap();
        let (phrases_json, text_len): (String, i64) = conn
            .query_row(
                "SELECT keyphrases, processed_text_length FROM feed_topic_analysis",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        let phrases: Vec<Keyphrase> = serde_json::from_str(&phrases_json).unwrap();
        assert!(!phrases.is_empty());
        assert!(text_len >= MIN_TEXT_CHARS as i64);
    }

    fn feed_item(link: &str, title: &str) -> FeedItem {
        FeedItem {
            source_id: 1,
            source_name: "clarin economia".into(),
            title: title.into(),
            summary: String::new(),
            content: String::new(),
            description: String::new(),
            link: link.into(),
            pub_date: "2026-08-21T09:00:00.000000Z".into(),
            source_url: "https://www.clarin.com/rss/economia/".into(),
            image_url: None,
            author: None,
            tags: Vec::new(),
            execution_id: 1,
        }
    }
}
