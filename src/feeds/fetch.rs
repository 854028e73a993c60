//! Feed retrieval -- HTTP fetch plus decoding into raw entries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser::{self, ParseFeedError};
use reqwest::Client;

use super::FeedError;

/// One feed entry before any cleanup. HTML-bearing fields keep their markup,
/// the collector strips it.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    /// URLs of links marked rel=enclosure, in document order.
    pub enclosures: Vec<String>,
    /// URLs of media attachments, in document order.
    pub media: Vec<String>,
}

/// Source of entries for a feed URL. The HTTP implementation is swapped out
/// for a scripted one in tests.
#[async_trait]
pub trait FeedFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FeedError>;
}

/// Fetches feeds over HTTP with a shared client.
pub struct HttpFeedFetcher {
    client: Client,
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedFetch for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FeedError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        parse_entries(&bytes).map_err(|e| FeedError::Parse {
            url: url.to_string(),
            source: e,
        })
    }
}

/// Decode a feed document (RSS or Atom) into raw entries.
pub fn parse_entries(bytes: &[u8]) -> Result<Vec<RawEntry>, ParseFeedError> {
    let feed = parser::parse(bytes)?;
    Ok(feed.entries.into_iter().map(raw_entry_from).collect())
}

fn raw_entry_from(entry: Entry) -> RawEntry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());

    let enclosures = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| l.href.clone())
        .collect();

    let mut media = Vec::new();
    for object in &entry.media {
        for content in &object.content {
            if let Some(url) = &content.url {
                media.push(url.to_string());
            }
        }
    }

    // RSS carries one body under <description>, surfaced by the parser as
    // the summary. Keep both fields populated so downstream columns match.
    let summary = entry.summary.map(|t| t.content);

    RawEntry {
        title: entry.title.map(|t| t.content),
        description: summary.clone(),
        summary,
        content: entry.content.and_then(|c| c.body),
        link,
        author: entry
            .authors
            .first()
            .map(|p| p.name.clone())
            .filter(|n| !n.is_empty()),
        tags: entry
            .categories
            .into_iter()
            .map(|c| c.term)
            .filter(|t| !t.is_empty())
            .collect(),
        published: entry.published.or(entry.updated),
        enclosures,
        media,
    }
}
