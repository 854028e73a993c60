//! Persistence for NLP enrichment results.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{fmt_ts, Pool};

/// Sentiment verdict for one stored feed item.
#[derive(Debug, Clone)]
pub struct SentimentAnalysis {
    pub feed_id: i64,
    pub model_name: String,
    pub sentiment_label: String,
    pub sentiment_confidence: f64,
    /// Full per-label score map, stored as JSON.
    pub all_scores: serde_json::Value,
    pub text_preview: String,
    pub analysis_date: DateTime<Utc>,
    pub source: String,
    pub pub_date: String,
}

/// A ranked keyphrase. Lower score means more salient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyphrase {
    pub phrase: String,
    pub score: f64,
}

/// Keyphrase extraction result for one stored feed item.
#[derive(Debug, Clone)]
pub struct TopicAnalysis {
    pub feed_id: i64,
    pub analysis_date: DateTime<Utc>,
    pub keyphrases: Vec<Keyphrase>,
    pub text_preview: String,
    pub source: String,
    pub title: String,
    pub processed_text_length: usize,
}

pub struct AnalysisStore {
    pool: Pool,
}

impl AnalysisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn insert_sentiment(&self, doc: &SentimentAnalysis) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO feed_sentiment_analysis
                (feed_id, model_name, sentiment_label, sentiment_confidence,
                 all_scores, text_preview, analysis_date, source, pub_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                doc.feed_id,
                doc.model_name,
                doc.sentiment_label,
                doc.sentiment_confidence,
                doc.all_scores.to_string(),
                doc.text_preview,
                fmt_ts(doc.analysis_date),
                doc.source,
                doc.pub_date,
            ],
        )
        .context("inserting sentiment analysis")?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_topics(&self, doc: &TopicAnalysis) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO feed_topic_analysis
                (feed_id, analysis_date, keyphrases, text_preview,
                 source, title, processed_text_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                doc.feed_id,
                fmt_ts(doc.analysis_date),
                serde_json::to_string(&doc.keyphrases)?,
                doc.text_preview,
                doc.source,
                doc.title,
                doc.processed_text_length as i64,
            ],
        )
        .context("inserting topic analysis")?;
        Ok(conn.last_insert_rowid())
    }
}
