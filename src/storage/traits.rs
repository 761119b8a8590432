//! Storage traits and error types
//!
//! This module defines the trait interface for the link scheduler consumed
//! by continuation strategies, and the associated error types.

use crate::storage::UriRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persists discovered URIs for future crawls
///
/// Implementations must be safe to share between concurrent crawls.
#[async_trait]
pub trait LinkScheduler: Send + Sync {
    /// Checks whether `uri` has already been scheduled
    ///
    /// Comparison is exact-string: `https://a.com/x` and `https://a.com/x/`
    /// are different links.
    async fn uri_link_exists(&self, uri: &str) -> StorageResult<bool>;

    /// Schedules a newly discovered URI
    async fn add(&self, record: UriRecord) -> StorageResult<()>;
}
