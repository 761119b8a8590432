//! Sumi-Harvest: a polite structured-content crawler
//!
//! This crate fetches a page, matches a declarative tree of document-part
//! definitions against the parsed HTML, optionally downloads linked files and
//! schedules discovered links for future crawls, while pacing every network
//! call per host.

pub mod config;
pub mod continuation;
pub mod crawler;
pub mod document;
pub mod extract;
pub mod mapper;
pub mod metrics;
pub mod publish;
pub mod storage;
pub mod throttle;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid selector '{expression}': {reason}")]
    InvalidSelector { expression: String, reason: String },
}

/// The kind of failure that ended a crawl
#[derive(Debug, Error)]
pub enum CrawlErrorKind {
    #[error("invalid request, {field}: {reason}")]
    RequestValidation { field: &'static str, reason: String },

    #[error("page load failed: {0}")]
    PageLoad(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error(transparent)]
    Throttle(#[from] throttle::ThrottleError),

    #[error("continuation failed: {0}")]
    Continuation(#[from] continuation::ContinuationError),

    #[error("failed to publish crawl record: {0}")]
    Publish(String),

    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlErrorKind {
    /// Short, stable label for this kind (used in failure records)
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestValidation { .. } => "request_validation",
            Self::PageLoad(_) => "page_load",
            Self::Extraction(_) => "extraction",
            Self::Throttle(_) => "throttle",
            Self::Continuation(_) => "continuation",
            Self::Publish(_) => "publish",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A crawl failure together with the context needed to reprocess it
#[derive(Debug, Error)]
#[error(
    "crawl failed at {stage} (host: {}, correlation: {}): {kind}",
    .host.as_deref().unwrap_or("-"),
    .correlation_id.as_deref().unwrap_or("-")
)]
pub struct CrawlError {
    /// The pipeline stage that could not be reached
    pub stage: crawler::CrawlStage,

    /// Host of the target URI, when it was known
    pub host: Option<String>,

    /// Correlation id of the originating request, when it was known
    pub correlation_id: Option<String>,

    #[source]
    pub kind: CrawlErrorKind,
}

impl CrawlError {
    pub fn new(stage: crawler::CrawlStage, kind: CrawlErrorKind) -> Self {
        Self {
            stage,
            host: None,
            correlation_id: None,
            kind,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Returns true if the crawl ended because of an external cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, CrawlErrorKind::Cancelled)
    }
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::crawler::{CrawlRequest, CrawlResponse, CrawlStage, Crawler, Request};
pub use crate::document::{DocumentPart, PartKind, Selector};
pub use crate::extract::{parse, Anomaly, AnomalyKind, Extraction};
pub use crate::url::{extract_domain, resolve_link};
