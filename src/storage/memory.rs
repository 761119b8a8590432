//! In-memory link scheduler

use crate::storage::traits::{LinkScheduler, StorageError, StorageResult};
use crate::storage::UriRecord;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// Keeps scheduled links in process memory, in insertion order
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    seen: HashSet<String>,
    records: Vec<UriRecord>,
}

impl InMemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every scheduled record
    pub fn records(&self) -> Vec<UriRecord> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    /// Scheduled URIs, in insertion order
    pub fn uris(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.uri).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LinkScheduler for InMemoryLinkStore {
    async fn uri_link_exists(&self, uri: &str) -> StorageResult<bool> {
        let inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(inner.seen.contains(uri))
    }

    async fn add(&self, record: UriRecord) -> StorageResult<()> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        if inner.seen.insert(record.uri.clone()) {
            inner.records.push(record);
        }
        Ok(())
    }
}
