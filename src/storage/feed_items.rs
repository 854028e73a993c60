//! Feed item repository -- collected articles keyed by link.

use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter};

use super::Pool;

/// SQLite caps bound variables per statement, stay well under it.
const CHUNK: usize = 500;

/// A collected article ready for insertion.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub source_id: i64,
    pub source_name: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
    /// URL of the feed the item came from.
    pub source_url: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub execution_id: i64,
}

/// A stored article with its row id.
#[derive(Debug, Clone)]
pub struct StoredFeedItem {
    pub id: i64,
    pub source_id: i64,
    pub source_name: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
    pub source_url: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub execution_id: i64,
}

pub struct FeedItemStore {
    pool: Pool,
}

impl FeedItemStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Subset of `links` already present in storage, queried in chunks.
    pub fn existing_links(&self, links: &[String]) -> Result<HashSet<String>> {
        let conn = self.pool.get()?;
        let mut found = HashSet::new();
        for chunk in links.chunks(CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT link FROM rss_feeds_data WHERE link IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            for link in rows {
                found.insert(link?);
            }
        }
        Ok(found)
    }

    /// Insert a batch of items and return how many went in. Callers are
    /// expected to have deduplicated beforehand, the unique link index is
    /// only the backstop.
    pub fn insert_items(&self, items: &[FeedItem]) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rss_feeds_data
                    (source_id, source_name, title, summary, content, description,
                     link, pub_date, source, image_url, author, tags, execution_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for item in items {
                stmt.execute(params![
                    item.source_id,
                    item.source_name,
                    item.title,
                    item.summary,
                    item.content,
                    item.description,
                    item.link,
                    item.pub_date,
                    item.source_url,
                    item.image_url,
                    item.author,
                    serde_json::to_string(&item.tags)?,
                    item.execution_id,
                ])
                .with_context(|| format!("inserting feed item {}", item.link))?;
            }
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// Delete every item belonging to the given execution ids. Returns the
    /// number of rows removed.
    pub fn delete_by_execution_ids(&self, execution_ids: &[i64]) -> Result<usize> {
        if execution_ids.is_empty() {
            return Ok(0);
        }
        let conn = self.pool.get()?;
        let mut deleted = 0;
        for chunk in execution_ids.chunks(CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "DELETE FROM rss_feeds_data WHERE execution_id IN ({})",
                placeholders
            );
            deleted += conn.execute(&sql, params_from_iter(chunk.iter()))?;
        }
        Ok(deleted)
    }

    /// Stored items in insertion order, optionally capped.
    pub fn all(&self, limit: Option<usize>) -> Result<Vec<StoredFeedItem>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, source_id, source_name, title, summary, content, description,
                    link, pub_date, source, image_url, author, tags, execution_id
             FROM rss_feeds_data
             ORDER BY id
             LIMIT ?1",
        )?;
        // A negative LIMIT means unbounded in SQLite.
        let cap = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![cap], map_item)?;

        let mut items = Vec::new();
        for item in rows {
            items.push(item?);
        }
        Ok(items)
    }
}

fn map_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFeedItem> {
    let tags_text: String = row.get(12)?;
    Ok(StoredFeedItem {
        id: row.get(0)?,
        source_id: row.get(1)?,
        source_name: row.get(2)?,
        title: row.get(3)?,
        summary: row.get(4)?,
        content: row.get(5)?,
        description: row.get(6)?,
        link: row.get(7)?,
        pub_date: row.get(8)?,
        source_url: row.get(9)?,
        image_url: row.get(10)?,
        author: row.get(11)?,
        tags: serde_json::from_str(&tags_text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?,
        execution_id: row.get(13)?,
    })
}
