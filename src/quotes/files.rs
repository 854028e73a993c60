//! Download directory management and quote CSV normalization.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::DateTime;

use crate::storage::quotes::QuoteRow;

/// The directory the browser drops exports into. Also the final home of
/// adopted files.
pub struct DownloadDir {
    root: PathBuf,
}

impl DownloadDir {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating download directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Names of the CSV files currently present. Snapshotted before a
    /// download so the new arrival can be told apart.
    pub fn existing_csv_names(&self) -> Result<HashSet<String>> {
        let mut names = HashSet::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false);
            if is_csv {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Move a file into the directory under its final name.
    pub fn adopt(&self, src: &Path, final_name: &str) -> Result<PathBuf> {
        let target = self.root.join(final_name);
        if src == target {
            return Ok(target);
        }
        if fs::rename(src, &target).is_err() {
            // Source may sit on another filesystem.
            fs::copy(src, &target)
                .with_context(|| format!("copying {} into place", src.display()))?;
            fs::remove_file(src)
                .with_context(|| format!("removing original {}", src.display()))?;
        }
        Ok(target)
    }
}

/// Read a quote CSV, mapping the portal's Spanish column names onto the
/// normalized row shape. Unrecognized columns survive in `extra`.
pub fn read_quotes(path: &Path) -> Result<Vec<QuoteRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening quote csv {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        let mut row = QuoteRow::default();
        for (header, value) in headers.iter().zip(record.iter()) {
            apply_column(&mut row, header, value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn apply_column(row: &mut QuoteRow, header: &str, value: &str) {
    let value = value.trim();
    match canonical_header(header) {
        "ticker" => row.ticker = non_empty(value),
        "date" => row.date = non_empty(value),
        "open" => set_numeric(&mut row.open, &mut row.extra, header, value),
        "high" => set_numeric(&mut row.high, &mut row.extra, header, value),
        "low" => set_numeric(&mut row.low, &mut row.extra, header, value),
        "close" => set_numeric(&mut row.close, &mut row.extra, header, value),
        "volume" => set_numeric(&mut row.volume, &mut row.extra, header, value),
        "timestamp" => {
            // Portal exports carry epoch seconds here.
            let converted = value
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.to_rfc3339());
            row.extra.insert(
                "timestamp".to_string(),
                converted.unwrap_or_else(|| value.to_string()),
            );
        }
        other => {
            row.extra.insert(other.trim().to_string(), value.to_string());
        }
    }
}

fn canonical_header(header: &str) -> &str {
    match header.trim().to_lowercase().as_str() {
        "especie" | "ticker" => "ticker",
        "fecha" | "date" => "date",
        "apertura" | "open" => "open",
        "maximo" | "máximo" | "high" => "high",
        "minimo" | "mínimo" | "low" => "low",
        "cierre" | "close" => "close",
        "volumen" | "volume" => "volume",
        "timestamp" => "timestamp",
        _ => header,
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn set_numeric(
    field: &mut Option<f64>,
    extra: &mut std::collections::BTreeMap<String, String>,
    header: &str,
    value: &str,
) {
    if value.is_empty() {
        return;
    }
    match value.parse::<f64>() {
        Ok(n) => *field = Some(n),
        // Keep the raw text rather than losing the cell.
        Err(_) => {
            extra.insert(header.trim().to_string(), value.to_string());
        }
    }
}
