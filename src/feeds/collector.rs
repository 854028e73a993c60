//! RSS collection pipeline with execution tracking.
//!
//! Every run writes a `running` execution record first, then moves it to
//! exactly one terminal status (`skipped`, `success` or `failed`) before
//! returning. Items are tied to their run through `execution_id`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::feeds::extract::{extract_image_url, html_to_text};
use crate::feeds::fetch::{FeedFetch, RawEntry};
use crate::feeds::{CollectionOutcome, FeedSource};
use crate::storage::execution_log::{ExecutionLogStore, ExecutionStatus};
use crate::storage::feed_items::{FeedItem, FeedItemStore};
use crate::storage::{fmt_ts, Pool};

/// Process name under which collection runs are logged.
pub const PROCESS_NAME: &str = "collect_feeds";

pub struct RssCollectorService<F> {
    executions: ExecutionLogStore,
    items: FeedItemStore,
    fetcher: F,
}

impl<F: FeedFetch> RssCollectorService<F> {
    pub fn new(pool: Pool, fetcher: F) -> Self {
        Self {
            executions: ExecutionLogStore::new(pool.clone()),
            items: FeedItemStore::new(pool),
            fetcher,
        }
    }

    /// Run one collection cycle over `sources`.
    ///
    /// Skips without fetching when the most recent successful run is less
    /// than `hours_threshold` hours old. A threshold of zero disables the
    /// throttle.
    pub async fn fetch_and_store(
        &self,
        sources: &[FeedSource],
        hours_threshold: i64,
    ) -> Result<CollectionOutcome> {
        info!(hours_threshold, "Starting RSS feed collection");

        // 1. Record the run before doing anything else so a crash still
        //    leaves an observable `running` row behind.
        let start = Utc::now();
        let parameters = serde_json::json!({ "hours_threshold": hours_threshold });
        let execution_id = self
            .executions
            .insert_running(PROCESS_NAME, start, &parameters)?;
        info!(execution_id, "Created execution record");

        let result = self
            .run_guarded(sources, hours_threshold, start, execution_id)
            .await;
        let duration = seconds_since(start);

        match result {
            Ok(CollectionOutcome::Skipped) => {
                self.executions.mark_finished(
                    execution_id,
                    ExecutionStatus::Skipped,
                    duration,
                    None,
                )?;
                info!(execution_id, "Collection skipped");
                Ok(CollectionOutcome::Skipped)
            }
            Ok(outcome @ CollectionOutcome::Completed { fetched, inserted }) => {
                self.executions.mark_finished(
                    execution_id,
                    ExecutionStatus::Success,
                    duration,
                    None,
                )?;
                info!(
                    execution_id,
                    fetched,
                    inserted,
                    duration_seconds = duration,
                    "RSS collection completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(execution_id, duration_seconds = duration, "RSS collection failed: {:#}", e);
                if let Err(update_err) = self.executions.mark_finished(
                    execution_id,
                    ExecutionStatus::Failed,
                    duration,
                    Some(&format!("{e:#}")),
                ) {
                    error!(execution_id, "Failed to record the failure: {:#}", update_err);
                }
                Err(e)
            }
        }
    }

    /// Steps 2 through 6. Any error here moves the record to `failed`.
    async fn run_guarded(
        &self,
        sources: &[FeedSource],
        hours_threshold: i64,
        start: DateTime<Utc>,
        execution_id: i64,
    ) -> Result<CollectionOutcome> {
        // 2. Throttle against the last successful run.
        if let Some(last) = self
            .executions
            .find_latest_by_status(PROCESS_NAME, ExecutionStatus::Success)?
        {
            let elapsed = start - last.execution_time;
            if elapsed < Duration::hours(hours_threshold) {
                info!(
                    last_success=%last.execution_time,
                    hours_threshold,
                    "Skipping collection, last successful run is inside the threshold window"
                );
                return Ok(CollectionOutcome::Skipped);
            }
        }

        // 3. Same-day retention sweep: items from earlier runs today are
        //    replaced by this run's crop. Yesterday and older stay put.
        let today_ids = self
            .executions
            .find_ids_since(PROCESS_NAME, start_of_utc_day(start))?;
        let prior_ids: Vec<i64> = today_ids
            .into_iter()
            .filter(|id| *id != execution_id)
            .collect();
        if !prior_ids.is_empty() {
            let deleted = self.items.delete_by_execution_ids(&prior_ids)?;
            info!(deleted, runs = prior_ids.len(), "Removed items from earlier runs today");
        }

        // 4. Fetch every source in order. One bad feed fails the run.
        let mut all_items: Vec<FeedItem> = Vec::new();
        for source in sources {
            let entries = self
                .fetcher
                .fetch(&source.url)
                .await
                .with_context(|| format!("fetching feed {}", source.url))?;

            let collected_at = Utc::now();
            let before = all_items.len();
            for raw in entries {
                match build_item(source, raw, execution_id, collected_at) {
                    Some(item) => all_items.push(item),
                    None => warn!(source=%source.url, "Skipping entry without a link"),
                }
            }
            let count = all_items.len() - before;
            if count == 0 {
                warn!(source=%source.url, "No items found in feed");
            } else {
                info!(source=%source.url, count, "Collected items");
            }
        }
        let fetched = all_items.len();
        info!(fetched, "Total articles collected");

        // 5. Drop links already stored, then repeats inside this batch.
        let fresh = self.dedup_new_items(all_items)?;

        // 6. Store whatever survived.
        let inserted = if fresh.is_empty() {
            info!("No new items to insert");
            0
        } else {
            let inserted = self.items.insert_items(&fresh)?;
            info!(inserted, "Inserted new items");
            inserted
        };

        Ok(CollectionOutcome::Completed { fetched, inserted })
    }

    fn dedup_new_items(&self, items: Vec<FeedItem>) -> Result<Vec<FeedItem>> {
        let links: Vec<String> = items.iter().map(|i| i.link.clone()).collect();
        let existing = self.items.existing_links(&links)?;

        let mut seen = HashSet::new();
        Ok(items
            .into_iter()
            .filter(|i| !existing.contains(&i.link) && seen.insert(i.link.clone()))
            .collect())
    }
}

/// Normalize one raw entry into a storable item. Entries without a link
/// cannot be deduplicated and yield none.
fn build_item(
    source: &FeedSource,
    raw: RawEntry,
    execution_id: i64,
    collected_at: DateTime<Utc>,
) -> Option<FeedItem> {
    let link = raw.link.as_deref().filter(|l| !l.is_empty())?.to_string();
    let image_url = extract_image_url(&raw);

    Some(FeedItem {
        source_id: source.source_id,
        source_name: source.name.clone(),
        title: html_to_text(raw.title.as_deref().unwrap_or_default()),
        summary: html_to_text(raw.summary.as_deref().unwrap_or_default()),
        content: html_to_text(raw.content.as_deref().unwrap_or_default()),
        description: html_to_text(raw.description.as_deref().unwrap_or_default()),
        link,
        pub_date: raw
            .published
            .map(fmt_ts)
            .unwrap_or_else(|| fmt_ts(collected_at)),
        source_url: source.url.clone(),
        image_url,
        author: raw.author,
        tags: raw.tags,
        execution_id,
    })
}

fn seconds_since(start: DateTime<Utc>) -> f64 {
    (Utc::now() - start).num_milliseconds() as f64 / 1000.0
}

fn start_of_utc_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}
