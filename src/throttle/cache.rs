//! Shared throttle state
//!
//! The last-request time and active-download flag of each host live in a
//! cache shared by every crawler process, so that separate processes pace a
//! host collectively.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by a shared cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("shared cache unavailable: {0}")]
    Unavailable(String),

    #[error("shared cache lock poisoned")]
    LockPoisoned,
}

/// The distributed cache collaborator consulted by every throttle
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// When a request was last sent to `host`, if ever
    async fn last_request_time(&self, host: &str) -> Result<Option<DateTime<Utc>>, CacheError>;

    /// Records "now" as the last request time for `host`
    async fn store_last_request(&self, host: &str) -> Result<(), CacheError>;

    /// Whether any process is currently downloading from `host`
    async fn is_active_download(&self, host: &str) -> Result<bool, CacheError>;

    async fn set_active_download(&self, host: &str, active: bool) -> Result<(), CacheError>;
}

/// Process-local shared cache
///
/// Suitable for a single crawler process; multiple processes need a
/// backend they can all reach.
#[derive(Debug, Default)]
pub struct InMemorySharedCache {
    last_requests: Mutex<HashMap<String, DateTime<Utc>>>,
    active_downloads: Mutex<HashMap<String, bool>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn last_request_time(&self, host: &str) -> Result<Option<DateTime<Utc>>, CacheError> {
        let last_requests = self
            .last_requests
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?;
        Ok(last_requests.get(host).copied())
    }

    async fn store_last_request(&self, host: &str) -> Result<(), CacheError> {
        let mut last_requests = self
            .last_requests
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?;
        last_requests.insert(host.to_string(), Utc::now());
        Ok(())
    }

    async fn is_active_download(&self, host: &str) -> Result<bool, CacheError> {
        let active = self
            .active_downloads
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?;
        Ok(active.get(host).copied().unwrap_or(false))
    }

    async fn set_active_download(&self, host: &str, active: bool) -> Result<(), CacheError> {
        let mut downloads = self
            .active_downloads
            .lock()
            .map_err(|_| CacheError::LockPoisoned)?;
        downloads.insert(host.to_string(), active);
        Ok(())
    }
}
