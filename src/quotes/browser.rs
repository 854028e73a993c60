//! Browser automation seam for portals that only export CSV behind a click.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Poll cadence while waiting for a download to land.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Polls before a wait gives up.
pub const MAX_POLL_ATTEMPTS: u32 = 30;

/// Drives a browser pointed at a quote portal. Implementations live outside
/// this crate, tests script one.
#[async_trait]
pub trait BrowserClient: Send + Sync {
    /// Open the portal page.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Click through whatever the portal needs to start the CSV export.
    async fn trigger_download(&self) -> Result<()>;

    /// Wait until a file that was not in `existing` finishes downloading,
    /// returning its path. Implementations poll at [`POLL_INTERVAL`] up to
    /// [`MAX_POLL_ATTEMPTS`] times.
    async fn await_new_file(&self, existing: &HashSet<String>) -> Result<PathBuf>;
}
