//! Database schema and migrations.

use anyhow::Result;
use rusqlite::Connection;

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS process_execution_logs (
            id INTEGER PRIMARY KEY,
            process_name TEXT NOT NULL,
            execution_time TEXT NOT NULL,
            status TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            execution_duration REAL,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS rss_feeds_data (
            id INTEGER PRIMARY KEY,
            source_id INTEGER NOT NULL,
            source_name TEXT NOT NULL,
            title TEXT NOT NULL,
            summary TEXT NOT NULL,
            content TEXT NOT NULL,
            description TEXT NOT NULL,
            link TEXT NOT NULL,
            pub_date TEXT NOT NULL,
            source TEXT NOT NULL,
            image_url TEXT,
            author TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            execution_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS feed_sentiment_analysis (
            id INTEGER PRIMARY KEY,
            feed_id INTEGER NOT NULL,
            model_name TEXT NOT NULL,
            sentiment_label TEXT NOT NULL,
            sentiment_confidence REAL NOT NULL,
            all_scores TEXT NOT NULL,
            text_preview TEXT NOT NULL,
            analysis_date TEXT NOT NULL,
            source TEXT NOT NULL,
            pub_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feed_topic_analysis (
            id INTEGER PRIMARY KEY,
            feed_id INTEGER NOT NULL,
            analysis_date TEXT NOT NULL,
            keyphrases TEXT NOT NULL,
            text_preview TEXT NOT NULL,
            source TEXT NOT NULL,
            title TEXT NOT NULL,
            processed_text_length INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS market_quotes (
            id INTEGER PRIMARY KEY,
            ticker TEXT,
            date TEXT,
            open REAL,
            high REAL,
            low REAL,
            close REAL,
            volume REAL,
            extra TEXT NOT NULL DEFAULT '{}',
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_execution_logs_lookup
            ON process_execution_logs(process_name, status, execution_time);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_rss_feeds_link ON rss_feeds_data(link);
        CREATE INDEX IF NOT EXISTS idx_rss_feeds_execution ON rss_feeds_data(execution_id);
        CREATE INDEX IF NOT EXISTS idx_sentiment_feed ON feed_sentiment_analysis(feed_id);
        CREATE INDEX IF NOT EXISTS idx_topic_feed ON feed_topic_analysis(feed_id);
        CREATE INDEX IF NOT EXISTS idx_quotes_ticker_date ON market_quotes(ticker, date);",
    )?;

    Ok(())
}
