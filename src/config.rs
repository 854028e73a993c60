//! Environment-driven settings and the built-in source roster.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::feeds::FeedSource;
use crate::quotes::service::QuoteTarget;

pub const DEFAULT_HOURS_THRESHOLD: i64 = 6;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub download_dir: PathBuf,
    /// Minimum hours between successful feed collections.
    pub hours_threshold: i64,
}

impl Settings {
    pub fn from_env() -> Self {
        let db_path = std::env::var("FEEDMEDIC_DB")
            .unwrap_or_else(|_| "data/feedmedic.db".to_string())
            .into();
        let download_dir = std::env::var("DOWNLOAD_DIR")
            .unwrap_or_else(|_| "downloads".to_string())
            .into();
        let hours_threshold = std::env::var("FEEDS_UPDATE_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HOURS_THRESHOLD);
        Self {
            db_path,
            download_dir,
            hours_threshold,
        }
    }
}

/// Load `.env.local` when present, `.env` otherwise. Missing files are fine.
pub fn load_env() {
    if dotenvy::from_filename(".env.local").is_ok() {
        return;
    }
    let _ = dotenvy::dotenv();
}

/// Feeds collected when no `--sources` file is given.
pub fn default_feed_sources() -> Vec<FeedSource> {
    [
        (1, "clarin economia", "https://www.clarin.com/rss/economia/"),
        (
            2,
            "lanacion economia",
            "https://rss.app/feeds/1kL74AxcMUCjYsko.xml",
        ),
        (
            3,
            "pagina12 economia",
            "https://www.pagina12.com.ar/rss/secciones/economia/notas",
        ),
        (
            4,
            "infobae economia",
            "https://cdn.feedcontrol.net/13080/23180-IAH203wJ81I2f.xml",
        ),
        (
            9,
            "eleconomista finanzas",
            "https://eleconomista.com.ar/finanzas/feed/",
        ),
        (
            11,
            "laizquierdadiario",
            "https://www.laizquierdadiario.com/spip.php?page=backend&id_mot=13",
        ),
    ]
    .into_iter()
    .map(|(source_id, name, url)| FeedSource {
        source_id,
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

/// Quote portal pages pulled when no explicit target is given.
pub fn default_quote_targets() -> Vec<QuoteTarget> {
    vec![QuoteTarget {
        url: "https://www.rava.com/perfil/DOLAR%20MEP".to_string(),
        name: "Dolar MEP.csv".to_string(),
    }]
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    sources: Vec<FeedSource>,
}

/// Read a TOML source roster:
///
/// ```toml
/// [[sources]]
/// source_id = 1
/// name = "clarin economia"
/// url = "https://www.clarin.com/rss/economia/"
/// ```
pub fn load_sources(path: &Path) -> Result<Vec<FeedSource>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading sources file {}", path.display()))?;
    let parsed: SourcesFile =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    for source in &parsed.sources {
        Url::parse(&source.url)
            .with_context(|| format!("invalid url for source '{}'", source.name))?;
    }
    Ok(parsed.sources)
}
