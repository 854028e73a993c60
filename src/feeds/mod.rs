//! RSS feed collection -- fetching, extraction, the tracked pipeline.

pub mod collector;
pub mod extract;
pub mod fetch;

use serde::Deserialize;
use thiserror::Error;

/// A configured feed to collect from.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub source_id: i64,
    pub name: String,
    pub url: String,
}

/// What a collection run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOutcome {
    /// The last successful run is still inside the throttle window.
    Skipped,
    Completed { fetched: usize, inserted: usize },
}

/// Errors raised while retrieving or decoding a single feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http status {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("transport error fetching {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed feed from {url}")]
    Parse {
        url: String,
        #[source]
        source: feed_rs::parser::ParseFeedError,
    },
}
