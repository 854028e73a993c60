//! Execution log repository -- one row per pipeline run.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::params;
use thiserror::Error;

use super::{fmt_ts, parse_ts, Pool};

/// Lifecycle states of a pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Error)]
#[error("unknown execution status '{0}'")]
pub struct ParseStatusError(String);

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "skipped" => Ok(ExecutionStatus::Skipped),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A single pipeline run as recorded in `process_execution_logs`.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub id: i64,
    pub process_name: String,
    pub execution_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub parameters: serde_json::Value,
    /// Wall-clock seconds, set when the run reaches a terminal status.
    pub execution_duration: Option<f64>,
    pub error_message: Option<String>,
}

pub struct ExecutionLogStore {
    pool: Pool,
}

impl ExecutionLogStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Insert a new record in `running` state and return its id.
    pub fn insert_running(
        &self,
        process_name: &str,
        executed_at: DateTime<Utc>,
        parameters: &serde_json::Value,
    ) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO process_execution_logs (process_name, execution_time, status, parameters)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                process_name,
                fmt_ts(executed_at),
                ExecutionStatus::Running.to_string(),
                parameters.to_string(),
            ],
        )
        .context("inserting execution record")?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent record for a process in the given status, by execution time.
    pub fn find_latest_by_status(
        &self,
        process_name: &str,
        status: ExecutionStatus,
    ) -> Result<Option<ExecutionRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, process_name, execution_time, status, parameters,
                    execution_duration, error_message
             FROM process_execution_logs
             WHERE process_name = ?1 AND status = ?2
             ORDER BY execution_time DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![process_name, status.to_string()], map_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Ids of every record for a process executed at or after `since`,
    /// regardless of status.
    pub fn find_ids_since(&self, process_name: &str, since: DateTime<Utc>) -> Result<Vec<i64>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM process_execution_logs
             WHERE process_name = ?1 AND execution_time >= ?2",
        )?;
        let rows = stmt.query_map(params![process_name, fmt_ts(since)], |row| row.get(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }

    /// Move a record to a terminal status with its duration and, for
    /// failures, the error message.
    pub fn mark_finished(
        &self,
        id: i64,
        status: ExecutionStatus,
        duration_seconds: f64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let updated = conn
            .execute(
                "UPDATE process_execution_logs
                 SET status = ?2, execution_duration = ?3, error_message = ?4
                 WHERE id = ?1",
                params![id, status.to_string(), duration_seconds, error_message],
            )
            .context("updating execution record")?;
        if updated == 0 {
            anyhow::bail!("execution record {} not found", id);
        }
        Ok(())
    }

    /// Latest records across all processes, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, process_name, execution_time, status, parameters,
                    execution_duration, error_message
             FROM process_execution_logs
             ORDER BY execution_time DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], map_record)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let time_text: String = row.get(2)?;
    let status_text: String = row.get(3)?;
    let params_text: String = row.get(4)?;
    Ok(ExecutionRecord {
        id: row.get(0)?,
        process_name: row.get(1)?,
        execution_time: parse_ts(2, &time_text)?,
        status: status_text.parse().map_err(|e: ParseStatusError| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        parameters: serde_json::from_str(&params_text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        execution_duration: row.get(5)?,
        error_message: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_pool;
    use chrono::Duration;

    fn test_store() -> (ExecutionLogStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("test.db")).unwrap();
        (ExecutionLogStore::new(pool), dir)
    }

    #[test]
    fn test_insert_and_finish_roundtrip() {
        let (store, _dir) = test_store();
        let at = Utc::now();
        let params = serde_json::json!({ "hours_threshold": 6 });

        let id = store.insert_running("collect_feeds", at, &params).unwrap();
        let running = store
            .find_latest_by_status("collect_feeds", ExecutionStatus::Running)
            .unwrap()
            .unwrap();
        assert_eq!(running.id, id);
        assert_eq!(running.parameters["hours_threshold"], 6);
        assert!(running.execution_duration.is_none());

        store
            .mark_finished(id, ExecutionStatus::Success, 1.5, None)
            .unwrap();
        let done = store
            .find_latest_by_status("collect_feeds", ExecutionStatus::Success)
            .unwrap()
            .unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, ExecutionStatus::Success);
        assert_eq!(done.execution_duration, Some(1.5));
        assert!(done.error_message.is_none());
        assert!(store
            .find_latest_by_status("collect_feeds", ExecutionStatus::Running)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_latest_by_status_picks_newest() {
        let (store, _dir) = test_store();
        let params = serde_json::json!({});
        let now = Utc::now();

        let old = store
            .insert_running("collect_feeds", now - Duration::hours(10), &params)
            .unwrap();
        let new = store
            .insert_running("collect_feeds", now - Duration::hours(2), &params)
            .unwrap();
        store
            .mark_finished(old, ExecutionStatus::Success, 1.0, None)
            .unwrap();
        store
            .mark_finished(new, ExecutionStatus::Success, 1.0, None)
            .unwrap();

        let latest = store
            .find_latest_by_status("collect_feeds", ExecutionStatus::Success)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, new);
    }

    #[test]
    fn test_find_ids_since_ignores_status_but_not_process() {
        let (store, _dir) = test_store();
        let params = serde_json::json!({});
        let now = Utc::now();

        let recent = store.insert_running("collect_feeds", now, &params).unwrap();
        store
            .mark_finished(recent, ExecutionStatus::Failed, 0.1, Some("boom"))
            .unwrap();
        let old = store
            .insert_running("collect_feeds", now - Duration::days(2), &params)
            .unwrap();
        store.insert_running("other_process", now, &params).unwrap();

        let ids = store
            .find_ids_since("collect_feeds", now - Duration::hours(1))
            .unwrap();
        assert_eq!(ids, vec![recent]);
        assert!(!ids.contains(&old));
    }

    #[test]
    fn test_mark_finished_missing_record() {
        let (store, _dir) = test_store();
        let err = store.mark_finished(999, ExecutionStatus::Success, 1.0, None);
        assert!(err.is_err());
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let (store, _dir) = test_store();
        let params = serde_json::json!({});
        let now = Utc::now();
        store
            .insert_running("collect_feeds", now - Duration::hours(3), &params)
            .unwrap();
        let newest = store.insert_running("collect_feeds", now, &params).unwrap();

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, newest);

        let capped = store.recent(1).unwrap();
        assert_eq!(capped.len(), 1);
    }
}
