//! SQLite storage implementation
//!
//! One database holds both the links scheduled by continuation strategies
//! and the dead-letter log of failed crawls.

use crate::crawler::CrawlStage;
use crate::publish::{CrawlFailure, FailurePublisher, PublishError};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LinkScheduler, StorageError, StorageResult};
use crate::storage::UriRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Every scheduled link, oldest first
    pub fn scheduled_links(&self) -> StorageResult<Vec<UriRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT uri, host, source_uri, correlation_id, crawl_id, discovered_at
             FROM scheduled_links ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (uri, host, source_uri, correlation_id, crawl_id, discovered_at) = row?;
            records.push(UriRecord {
                uri,
                host,
                source_uri,
                correlation_id,
                crawl_id: parse_uuid(&crawl_id)?,
                discovered_at: parse_timestamp(&discovered_at)?,
            });
        }
        Ok(records)
    }

    /// Gets the number of scheduled links
    pub fn count_scheduled_links(&self) -> StorageResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM scheduled_links", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Every recorded crawl failure, oldest first
    pub fn failures(&self) -> StorageResult<Vec<CrawlFailure>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, crawler_id, crawl_id, correlation_id, uri, host, stage, kind, message, occurred_at,
                    request
             FROM crawl_failures ORDER BY occurred_at, rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, Option<String>>(10)?,
            ))
        })?;

        let mut failures = Vec::new();
        for row in rows {
            let (id, crawler_id, crawl_id, correlation_id, uri, host, stage, kind, message, at, request) =
                row?;
            failures.push(CrawlFailure {
                id: parse_uuid(&id)?,
                crawler_id: crawler_id.as_deref().map(parse_uuid).transpose()?,
                crawl_id: crawl_id.as_deref().map(parse_uuid).transpose()?,
                correlation_id,
                uri,
                host,
                stage: CrawlStage::from_db_string(&stage).ok_or_else(|| {
                    StorageError::Serialization(format!("unknown crawl stage '{}'", stage))
                })?,
                kind,
                message,
                occurred_at: parse_timestamp(&at)?,
                request: request
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()
                    .map_err(|e| StorageError::Serialization(format!("invalid stored request: {}", e)))?,
            });
        }
        Ok(failures)
    }

    /// Gets a failure by its id
    pub fn failure(&self, id: Uuid) -> StorageResult<Option<CrawlFailure>> {
        Ok(self.failures()?.into_iter().find(|f| f.id == id))
    }

    fn insert_failure(&self, failure: &CrawlFailure) -> StorageResult<()> {
        let request = failure
            .request
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn()?.execute(
            "INSERT INTO crawl_failures
                (id, crawler_id, crawl_id, correlation_id, uri, host, stage, kind, message, occurred_at,
                 request)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                failure.id.to_string(),
                failure.crawler_id.map(|id| id.to_string()),
                failure.crawl_id.map(|id| id.to_string()),
                failure.correlation_id,
                failure.uri,
                failure.host,
                failure.stage.to_db_string(),
                failure.kind,
                failure.message,
                failure.occurred_at.to_rfc3339(),
                request,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl LinkScheduler for SqliteStorage {
    async fn uri_link_exists(&self, uri: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT 1 FROM scheduled_links WHERE uri = ?1",
                params![uri],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn add(&self, record: UriRecord) -> StorageResult<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO scheduled_links
                (uri, host, source_uri, correlation_id, crawl_id, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.uri,
                record.host,
                record.source_uri,
                record.correlation_id,
                record.crawl_id.to_string(),
                record.discovered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl FailurePublisher for SqliteStorage {
    async fn publish(&self, failure: &CrawlFailure) -> Result<(), PublishError> {
        self.insert_failure(failure)?;
        tracing::debug!("Recorded crawl failure {} in dead-letter log", failure.id);
        Ok(())
    }
}

fn parse_uuid(value: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StorageError::Serialization(format!("invalid id '{}': {}", value, e)))
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("invalid timestamp '{}': {}", value, e)))
}
