use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use feedmedic::analysis::sentiment::{LexiconClassifier, SentimentAnalysisService};
use feedmedic::analysis::topics::{StatisticalExtractor, TopicAnalysisService};
use feedmedic::config::{self, Settings};
use feedmedic::feeds::collector::RssCollectorService;
use feedmedic::feeds::fetch::HttpFeedFetcher;
use feedmedic::feeds::CollectionOutcome;
use feedmedic::quotes::files::DownloadDir;
use feedmedic::quotes::service::import_csv;
use feedmedic::storage::execution_log::ExecutionLogStore;
use feedmedic::storage::quotes::QuoteStore;

#[derive(Parser)]
#[command(
    name = "feedmedic",
    about = "Appliance-grade collection of financial news feeds and market data",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the configured RSS feeds into the store
    CollectFeeds {
        /// Minimum hours since the last successful run (0 disables the throttle)
        #[arg(long)]
        hours_threshold: Option<i64>,

        /// TOML file overriding the built-in feed sources
        #[arg(long)]
        sources: Option<PathBuf>,
    },

    /// Import an already-downloaded quote CSV (the file is moved into the
    /// download directory)
    ImportQuotes {
        /// CSV file to import
        #[arg(long)]
        file: PathBuf,

        /// File name to adopt it under, e.g. "Dolar MEP.csv"
        #[arg(long)]
        name: String,
    },

    /// Classify sentiment for stored feed items
    AnalyzeSentiment {
        /// Maximum number of items to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Extract keyphrases from stored feed items
    AnalyzeTopics {
        /// Maximum number of items to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show recent execution records
    History {
        /// Number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::CollectFeeds {
            hours_threshold,
            sources,
        } => {
            let pool = feedmedic::storage::open_pool(&settings.db_path)?;
            let sources = match sources {
                Some(path) => config::load_sources(&path)?,
                None => config::default_feed_sources(),
            };
            let threshold = hours_threshold.unwrap_or(settings.hours_threshold);

            let service = RssCollectorService::new(pool, HttpFeedFetcher::new());
            match service.fetch_and_store(&sources, threshold).await? {
                CollectionOutcome::Skipped => {
                    println!(
                        "Collection skipped: last successful run is inside the threshold window."
                    );
                }
                CollectionOutcome::Completed { fetched, inserted } => {
                    println!("Collected {} items, {} new.", fetched, inserted);
                }
            }
        }
        Commands::ImportQuotes { file, name } => {
            let pool = feedmedic::storage::open_pool(&settings.db_path)?;
            let downloads = DownloadDir::new(&settings.download_dir)?;
            let store = QuoteStore::new(pool);
            let inserted = import_csv(&downloads, &store, &file, &name)?;
            println!("Imported {} quote rows.", inserted);
        }
        Commands::AnalyzeSentiment { limit } => {
            let pool = feedmedic::storage::open_pool(&settings.db_path)?;
            let service = SentimentAnalysisService::new(pool, LexiconClassifier::new());
            let summary = service.run(limit)?;
            println!(
                "Processed {} of {} items.",
                summary.processed, summary.examined
            );
            for (label, count) in &summary.distribution {
                println!("{:<10} : {}", label, count);
            }
        }
        Commands::AnalyzeTopics { limit } => {
            let pool = feedmedic::storage::open_pool(&settings.db_path)?;
            let service = TopicAnalysisService::new(pool, StatisticalExtractor::new());
            let summary = service.run(limit)?;
            println!(
                "Processed {} of {} items ({} skipped for insufficient text).",
                summary.processed, summary.examined, summary.skipped
            );
        }
        Commands::History { limit } => {
            let pool = feedmedic::storage::open_pool(&settings.db_path)?;
            let store = ExecutionLogStore::new(pool);
            let records = store.recent(limit)?;
            if records.is_empty() {
                println!("No execution records found.");
            } else {
                println!(
                    "{:<5} | {:<15} | {:<27} | {:<8} | {:<9} | Error",
                    "ID", "Process", "Started", "Status", "Duration"
                );
                println!(
                    "{:-<5}-|-{:-<15}-|-{:-<27}-|-{:-<8}-|-{:-<9}-|-{:-<20}",
                    "", "", "", "", "", ""
                );
                for r in records {
                    let duration = r
                        .execution_duration
                        .map(|d| format!("{:.2}s", d))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<5} | {:<15} | {:<27} | {:<8} | {:<9} | {}",
                        r.id,
                        r.process_name,
                        r.execution_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                        r.status.to_string(),
                        duration,
                        r.error_message.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }

    Ok(())
}
