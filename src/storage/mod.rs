//! Storage module for persisting crawl follow-up data
//!
//! This module handles:
//! - The link scheduler consumed by continuation strategies
//! - SQLite database initialization and schema management
//! - The dead-letter log of failed crawls
//! - An in-memory scheduler for single-process use and tests

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::InMemoryLinkStore;
pub use sqlite::SqliteStorage;
pub use traits::{LinkScheduler, StorageError, StorageResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A URI scheduled for a future crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UriRecord {
    /// The discovered URI, exactly as harvested
    pub uri: String,

    /// Host of `uri`
    pub host: String,

    /// The page the URI was discovered on
    pub source_uri: String,

    pub correlation_id: String,

    /// The crawl that discovered the URI
    pub crawl_id: Uuid,

    pub discovered_at: DateTime<Utc>,
}
