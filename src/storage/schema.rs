//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Links discovered by continuation strategies, waiting to be crawled
CREATE TABLE IF NOT EXISTS scheduled_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uri TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    source_uri TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    crawl_id TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scheduled_links_host ON scheduled_links(host);

-- Failed crawls, kept for reprocessing
CREATE TABLE IF NOT EXISTS crawl_failures (
    id TEXT PRIMARY KEY,
    crawler_id TEXT,
    crawl_id TEXT,
    correlation_id TEXT,
    uri TEXT,
    host TEXT,
    stage TEXT NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    occurred_at TEXT NOT NULL,
    request TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_failures_host ON crawl_failures(host);
CREATE INDEX IF NOT EXISTS idx_crawl_failures_kind ON crawl_failures(kind);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
