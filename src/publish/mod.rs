//! Failure publishing
//!
//! A failed crawl is never dropped silently: the [`Crawler`](crate::Crawler)
//! turns it into a [`CrawlFailure`] record echoing the request's ids and
//! hands it to a [`FailurePublisher`] for reprocessing.

use crate::crawler::{CrawlRequest, CrawlStage};
use crate::storage::StorageError;
use crate::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while publishing a failure record
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to store failure record: {0}")]
    Storage(#[from] StorageError),

    #[error("Failure sink unavailable: {0}")]
    Unavailable(String),
}

/// The dead-letter record of a failed crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub id: Uuid,

    /// Id of the failed request, when it got that far
    pub crawler_id: Option<Uuid>,

    pub crawl_id: Option<Uuid>,
    pub correlation_id: Option<String>,
    pub uri: Option<String>,
    pub host: Option<String>,

    /// The stage that could not be reached
    pub stage: CrawlStage,

    /// Stable label of the error kind
    pub kind: String,

    pub message: String,
    pub occurred_at: DateTime<Utc>,

    /// The failed request with its `error` filled in, ready to resubmit
    #[serde(default)]
    pub request: Option<CrawlRequest>,
}

impl CrawlFailure {
    /// Builds the record for `error`, echoing whatever the request carried
    pub fn new(request: Option<&CrawlRequest>, error: &CrawlError) -> Self {
        let load = request.and_then(|r| r.load_page_request.as_ref());

        Self {
            id: Uuid::new_v4(),
            crawler_id: request.map(|r| r.id),
            crawl_id: request.map(|r| r.crawl_id),
            correlation_id: error
                .correlation_id
                .clone()
                .or_else(|| load.map(|l| l.correlation_id.clone())),
            uri: load.map(|l| l.uri.clone()).filter(|uri| !uri.is_empty()),
            host: error.host.clone(),
            stage: error.stage,
            kind: error.kind.label().to_string(),
            message: error.to_string(),
            occurred_at: Utc::now(),
            request: request.map(|r| CrawlRequest {
                error: Some(error.to_string()),
                ..r.clone()
            }),
        }
    }
}

/// Receives failure records
#[async_trait]
pub trait FailurePublisher: Send + Sync {
    async fn publish(&self, failure: &CrawlFailure) -> Result<(), PublishError>;
}

/// Logs failures and keeps nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailurePublisher;

#[async_trait]
impl FailurePublisher for LogFailurePublisher {
    async fn publish(&self, failure: &CrawlFailure) -> Result<(), PublishError> {
        tracing::error!(
            stage = %failure.stage,
            kind = %failure.kind,
            correlation_id = failure.correlation_id.as_deref().unwrap_or("-"),
            "Crawl failed: {}",
            failure.message
        );
        Ok(())
    }
}

/// Keeps failures in memory
#[derive(Debug, Default)]
pub struct InMemoryFailurePublisher {
    failures: Mutex<Vec<CrawlFailure>>,
}

impl InMemoryFailurePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<CrawlFailure> {
        self.failures
            .lock()
            .map(|failures| failures.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FailurePublisher for InMemoryFailurePublisher {
    async fn publish(&self, failure: &CrawlFailure) -> Result<(), PublishError> {
        self.failures
            .lock()
            .map_err(|_| PublishError::Unavailable("failure list lock poisoned".to_string()))?
            .push(failure.clone());
        Ok(())
    }
}
