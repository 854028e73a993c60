//! End-to-end collection pipeline tests against a scripted fetcher and a
//! temporary database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use feedmedic::feeds::collector::{RssCollectorService, PROCESS_NAME};
use feedmedic::feeds::fetch::{FeedFetch, RawEntry};
use feedmedic::feeds::{CollectionOutcome, FeedError, FeedSource};
use feedmedic::storage::execution_log::{ExecutionLogStore, ExecutionStatus};
use feedmedic::storage::feed_items::{FeedItem, FeedItemStore};
use feedmedic::storage::{open_pool, Pool};

struct StubFetcher {
    responses: HashMap<String, Vec<RawEntry>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedFetch for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.get(url).cloned().unwrap_or_default())
    }
}

struct FailingFetcher;

#[async_trait]
impl FeedFetch for FailingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FeedError> {
        Err(FeedError::Status {
            status: 503,
            url: url.to_string(),
        })
    }
}

fn test_pool() -> (Pool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = open_pool(&dir.path().join("collector.db")).unwrap();
    (pool, dir)
}

fn source(id: i64, name: &str, url: &str) -> FeedSource {
    FeedSource {
        source_id: id,
        name: name.to_string(),
        url: url.to_string(),
    }
}

fn entry(link: &str, title: &str) -> RawEntry {
    RawEntry {
        title: Some(title.to_string()),
        summary: Some(format!("<p>{}&nbsp;<b>resumen</b></p>", title)),
        link: Some(link.to_string()),
        ..Default::default()
    }
}

fn stub(responses: &[(&str, Vec<RawEntry>)]) -> (StubFetcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetcher = StubFetcher {
        responses: responses
            .iter()
            .map(|(url, entries)| (url.to_string(), entries.clone()))
            .collect(),
        calls: calls.clone(),
    };
    (fetcher, calls)
}

/// Insert a finished run dated `at` so throttle and sweep see history.
fn prior_run(pool: &Pool, status: ExecutionStatus, at: DateTime<Utc>) -> i64 {
    prior_run_named(pool, PROCESS_NAME, status, at)
}

fn prior_run_named(pool: &Pool, process: &str, status: ExecutionStatus, at: DateTime<Utc>) -> i64 {
    let store = ExecutionLogStore::new(pool.clone());
    let id = store
        .insert_running(process, at, &serde_json::json!({}))
        .unwrap();
    store.mark_finished(id, status, 1.0, None).unwrap();
    id
}

fn attach_item(pool: &Pool, link: &str, execution_id: i64) {
    let item = FeedItem {
        source_id: 1,
        source_name: "clarin economia".into(),
        title: "old".into(),
        summary: String::new(),
        content: String::new(),
        description: String::new(),
        link: link.into(),
        pub_date: "2026-08-20T08:00:00.000000Z".into(),
        source_url: "https://www.clarin.com/rss/economia/".into(),
        image_url: None,
        author: None,
        tags: Vec::new(),
        execution_id,
    };
    FeedItemStore::new(pool.clone()).insert_items(&[item]).unwrap();
}

#[tokio::test]
async fn test_end_to_end_collection() {
    let (pool, _dir) = test_pool();
    let feed_url = "https://www.clarin.com/rss/economia/";
    let mut with_image = entry("https://e.com/a", "Suba del dolar");
    with_image.enclosures = vec!["https://img.example.com/a.jpg".into()];
    let (fetcher, _) = stub(&[(
        feed_url,
        vec![with_image, entry("https://e.com/b", "Inflacion de agosto")],
    )]);

    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", feed_url)], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 2,
            inserted: 2
        }
    );

    let record = ExecutionLogStore::new(pool.clone())
        .find_latest_by_status(PROCESS_NAME, ExecutionStatus::Success)
        .unwrap()
        .expect("run should finish in success");
    assert_eq!(record.parameters["hours_threshold"], 6);
    assert!(record.execution_duration.is_some());
    assert!(record.error_message.is_none());

    let items = FeedItemStore::new(pool).all(None).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].link, "https://e.com/a");
    assert_eq!(
        items[0].image_url.as_deref(),
        Some("https://img.example.com/a.jpg")
    );
    assert_eq!(items[0].summary, "Suba del dolar resumen");
    assert_eq!(items[1].image_url, None);
    assert!(items.iter().all(|i| i.execution_id == record.id));
}

#[tokio::test]
async fn test_throttle_skips_inside_window() {
    let (pool, _dir) = test_pool();
    prior_run(&pool, ExecutionStatus::Success, Utc::now() - Duration::hours(2));
    let (fetcher, calls) = stub(&[]);

    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(outcome, CollectionOutcome::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no fetch on a skipped run");

    let skipped = ExecutionLogStore::new(pool.clone())
        .find_latest_by_status(PROCESS_NAME, ExecutionStatus::Skipped)
        .unwrap()
        .expect("skip should be recorded");
    assert!(skipped.execution_duration.is_some());
    assert_eq!(skipped.parameters["hours_threshold"], 6);
    assert!(FeedItemStore::new(pool).all(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_throttle_allows_outside_window() {
    let (pool, _dir) = test_pool();
    prior_run(&pool, ExecutionStatus::Success, Utc::now() - Duration::hours(7));
    let (fetcher, calls) = stub(&[("https://feed", vec![entry("https://e.com/a", "t")])]);

    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 1,
            inserted: 1
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_threshold_disables_throttle() {
    let (pool, _dir) = test_pool();
    prior_run(&pool, ExecutionStatus::Success, Utc::now());
    let (fetcher, _) = stub(&[("https://feed", vec![entry("https://e.com/a", "t")])]);

    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 0)
        .await
        .unwrap();
    assert!(matches!(outcome, CollectionOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_failed_runs_do_not_satisfy_throttle() {
    let (pool, _dir) = test_pool();
    prior_run(&pool, ExecutionStatus::Failed, Utc::now() - Duration::minutes(5));
    let (fetcher, _) = stub(&[("https://feed", vec![entry("https://e.com/a", "t")])]);

    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert!(matches!(outcome, CollectionOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_same_day_sweep_replaces_earlier_runs() {
    let (pool, _dir) = test_pool();
    // A failed run earlier today left items behind. Another process's items
    // must not be touched.
    let prior = prior_run(&pool, ExecutionStatus::Failed, Utc::now());
    attach_item(&pool, "https://e.com/old", prior);
    let other = prior_run_named(&pool, "other_process", ExecutionStatus::Success, Utc::now());
    attach_item(&pool, "https://e.com/other", other);

    let (fetcher, _) = stub(&[(
        "https://feed",
        vec![
            entry("https://e.com/old", "republished"),
            entry("https://e.com/new", "fresh"),
        ],
    )]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 2,
            inserted: 2
        }
    );

    let record = ExecutionLogStore::new(pool.clone())
        .find_latest_by_status(PROCESS_NAME, ExecutionStatus::Success)
        .unwrap()
        .unwrap();
    let items = FeedItemStore::new(pool).all(None).unwrap();
    let links: Vec<&str> = items.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(items.len(), 3);
    assert!(links.contains(&"https://e.com/other"), "other process kept");
    // The swept link came back under the new execution id.
    let republished = items
        .iter()
        .find(|i| i.link == "https://e.com/old")
        .unwrap();
    assert_eq!(republished.execution_id, record.id);
}

#[tokio::test]
async fn test_sweep_spares_previous_days() {
    let (pool, _dir) = test_pool();
    let yesterday = prior_run(&pool, ExecutionStatus::Failed, Utc::now() - Duration::hours(25));
    attach_item(&pool, "https://e.com/yesterday", yesterday);

    let (fetcher, _) = stub(&[("https://feed", vec![entry("https://e.com/today", "t")])]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();

    let items = FeedItemStore::new(pool).all(None).unwrap();
    let links: Vec<&str> = items.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(links.len(), 2);
    assert!(links.contains(&"https://e.com/yesterday"));
    assert!(links.contains(&"https://e.com/today"));
}

#[tokio::test]
async fn test_dedup_across_runs_keeps_first_copy() {
    let (pool, _dir) = test_pool();
    // Yesterday's successful run already stored one of the links.
    let old = prior_run(&pool, ExecutionStatus::Success, Utc::now() - Duration::hours(25));
    attach_item(&pool, "https://e.com/seen", old);

    let (fetcher, _) = stub(&[(
        "https://feed",
        vec![
            entry("https://e.com/seen", "repeat"),
            entry("https://e.com/new", "fresh"),
        ],
    )]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 2,
            inserted: 1
        }
    );

    let items = FeedItemStore::new(pool).all(None).unwrap();
    let seen: Vec<_> = items.iter().filter(|i| i.link == "https://e.com/seen").collect();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].execution_id, old, "original row untouched");
}

#[tokio::test]
async fn test_dedup_within_a_run() {
    let (pool, _dir) = test_pool();
    let (fetcher, _) = stub(&[(
        "https://feed",
        vec![
            entry("https://e.com/a", "first"),
            entry("https://e.com/a", "duplicate"),
            entry("https://e.com/b", "other"),
        ],
    )]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 3,
            inserted: 2
        }
    );

    let items = FeedItemStore::new(pool).all(None).unwrap();
    let first = items.iter().find(|i| i.link == "https://e.com/a").unwrap();
    assert_eq!(first.title, "first", "first occurrence wins");
}

#[tokio::test]
async fn test_sources_fetched_in_order() {
    let (pool, _dir) = test_pool();
    let (fetcher, _) = stub(&[
        ("https://feed-a", vec![entry("https://e.com/a1", "a1")]),
        (
            "https://feed-b",
            vec![
                entry("https://e.com/b1", "b1"),
                entry("https://e.com/b2", "b2"),
            ],
        ),
    ]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let sources = [
        source(1, "feed a", "https://feed-a"),
        source(2, "feed b", "https://feed-b"),
    ];
    let outcome = service.fetch_and_store(&sources, 6).await.unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 3,
            inserted: 3
        }
    );

    let items = FeedItemStore::new(pool).all(None).unwrap();
    let links: Vec<&str> = items.iter().map(|i| i.link.as_str()).collect();
    assert_eq!(
        links,
        vec!["https://e.com/a1", "https://e.com/b1", "https://e.com/b2"]
    );
    assert_eq!(items[0].source_id, 1);
    assert_eq!(items[1].source_id, 2);
}

#[tokio::test]
async fn test_entries_without_link_are_dropped() {
    let (pool, _dir) = test_pool();
    let linkless = RawEntry {
        title: Some("no link".into()),
        ..Default::default()
    };
    let (fetcher, _) = stub(&[(
        "https://feed",
        vec![entry("https://e.com/a", "ok"), linkless],
    )]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let outcome = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::Completed {
            fetched: 1,
            inserted: 1
        }
    );
}

#[tokio::test]
async fn test_fetch_failure_finalizes_record() {
    let (pool, _dir) = test_pool();
    let service = RssCollectorService::new(pool.clone(), FailingFetcher);
    let result = service
        .fetch_and_store(&[source(1, "clarin economia", "https://feed")], 6)
        .await;
    assert!(result.is_err());

    let failed = ExecutionLogStore::new(pool.clone())
        .find_latest_by_status(PROCESS_NAME, ExecutionStatus::Failed)
        .unwrap()
        .expect("failure should be recorded");
    assert!(failed.execution_duration.is_some());
    let message = failed.error_message.expect("error message recorded");
    assert!(message.contains("503"), "got: {}", message);

    assert!(FeedItemStore::new(pool).all(None).unwrap().is_empty());
}

#[tokio::test]
async fn test_consecutive_runs_skip_then_collect() {
    let (pool, _dir) = test_pool();
    let feed_url = "https://feed";
    let (fetcher, _) = stub(&[(feed_url, vec![entry("https://e.com/a", "t")])]);
    let service = RssCollectorService::new(pool.clone(), fetcher);
    let sources = [source(1, "clarin economia", feed_url)];

    let first = service.fetch_and_store(&sources, 6).await.unwrap();
    assert!(matches!(first, CollectionOutcome::Completed { .. }));

    // Immediately after a success the throttle holds.
    let second = service.fetch_and_store(&sources, 6).await.unwrap();
    assert_eq!(second, CollectionOutcome::Skipped);

    let records = ExecutionLogStore::new(pool).recent(10).unwrap();
    assert_eq!(records.len(), 2);
    let statuses: Vec<ExecutionStatus> = records.iter().map(|r| r.status).collect();
    assert!(statuses.contains(&ExecutionStatus::Success));
    assert!(statuses.contains(&ExecutionStatus::Skipped));
}
