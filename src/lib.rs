//! feedmedic -- appliance-grade collection of financial news feeds and
//! market data.
//!
//! This crate provides the execution-tracked RSS collection pipeline, the
//! browser-driven quote import, the SQLite storage layer behind both, and
//! the NLP enrichment passes that run over stored items.

pub mod analysis;
pub mod config;
pub mod feeds;
pub mod quotes;
pub mod storage;
