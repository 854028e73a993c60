//! Market quote repository -- rows imported from exchange CSV exports.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::params;

use super::Pool;

/// One normalized quote row. Columns the normalizer does not recognize are
/// preserved verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteRow {
    pub ticker: Option<String>,
    pub date: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub extra: BTreeMap<String, String>,
}

pub struct QuoteStore {
    pool: Pool,
}

impl QuoteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert a batch of quote rows, returning how many went in.
    pub fn insert_rows(&self, rows: &[QuoteRow]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO market_quotes
                    (ticker, date, open, high, low, close, volume, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.ticker,
                    row.date,
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume,
                    serde_json::to_string(&row.extra)?,
                ])
                .context("inserting quote row")?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}
