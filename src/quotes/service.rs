//! Quote download pipeline -- navigate, export, adopt, store.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::quotes::browser::BrowserClient;
use crate::quotes::files::{read_quotes, DownloadDir};
use crate::storage::quotes::QuoteStore;

/// A portal page to pull one CSV export from. `name` becomes the adopted
/// file name.
#[derive(Debug, Clone)]
pub struct QuoteTarget {
    pub url: String,
    pub name: String,
}

pub struct QuoteDownloadService<B> {
    browser: B,
    downloads: DownloadDir,
    store: QuoteStore,
}

impl<B: BrowserClient> QuoteDownloadService<B> {
    pub fn new(browser: B, downloads: DownloadDir, store: QuoteStore) -> Self {
        Self {
            browser,
            downloads,
            store,
        }
    }

    /// Walk the targets in order, one browser round-trip each. Returns the
    /// total number of rows stored.
    pub async fn download_and_store(&self, targets: &[QuoteTarget]) -> Result<usize> {
        let mut total = 0;
        for target in targets {
            info!(url = %target.url, name = %target.name, "Collecting historical quotes");

            // Snapshot the directory first so the fresh download stands out.
            let existing = self.downloads.existing_csv_names()?;
            self.browser
                .navigate(&target.url)
                .await
                .with_context(|| format!("navigating to {}", target.url))?;
            self.browser
                .trigger_download()
                .await
                .with_context(|| format!("triggering export on {}", target.url))?;
            let downloaded = self
                .browser
                .await_new_file(&existing)
                .await
                .with_context(|| format!("waiting for export from {}", target.url))?;

            let final_path = self.downloads.adopt(&downloaded, &target.name)?;
            let rows = read_quotes(&final_path)?;
            if rows.is_empty() {
                warn!(file = %final_path.display(), "No rows parsed from download");
                continue;
            }
            let inserted = self.store.insert_rows(&rows)?;
            info!(inserted, file = %final_path.display(), "Imported quote rows");
            total += inserted;
        }
        Ok(total)
    }
}

/// Import an already-downloaded CSV: adopt it into the download directory
/// and store its rows.
pub fn import_csv(
    downloads: &DownloadDir,
    store: &QuoteStore,
    file: &Path,
    name: &str,
) -> Result<usize> {
    let final_path = downloads.adopt(file, name)?;
    let rows = read_quotes(&final_path)?;
    if rows.is_empty() {
        warn!(file = %final_path.display(), "No rows parsed from file");
        return Ok(0);
    }
    let inserted = store.insert_rows(&rows)?;
    info!(inserted, file = %final_path.display(), "Imported quote rows");
    Ok(inserted)
}
