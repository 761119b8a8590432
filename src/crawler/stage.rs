//! Crawl pipeline stages
//!
//! A crawl moves strictly forward through these stages; any failure ends it
//! in `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages of one crawl, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStage {
    // ===== Pipeline Stages =====
    /// The request carries everything a crawl needs
    Validated,

    /// The page source has been loaded through the request throttle
    PageLoaded,

    /// The definition tree has been matched against the page
    Extracted,

    /// Linked files have been downloaded (or the step was skipped)
    ContentDownloaded,

    /// Extraction anomalies have been reported
    AnomaliesProcessed,

    /// The response has been assembled
    ResponseBuilt,

    /// Discovered links have been handed to the scheduler
    ContinuationApplied,

    // ===== Terminal States =====
    /// The crawl finished every stage
    Done,

    /// A stage failed
    Failed,
}

impl CrawlStage {
    /// The stage that follows this one on success
    ///
    /// Returns None for terminal stages.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Validated => Some(Self::PageLoaded),
            Self::PageLoaded => Some(Self::Extracted),
            Self::Extracted => Some(Self::ContentDownloaded),
            Self::ContentDownloaded => Some(Self::AnomaliesProcessed),
            Self::AnomaliesProcessed => Some(Self::ResponseBuilt),
            Self::ResponseBuilt => Some(Self::ContinuationApplied),
            Self::ContinuationApplied => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns true if no further processing happens after this stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Converts the stage to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::PageLoaded => "page_loaded",
            Self::Extracted => "extracted",
            Self::ContentDownloaded => "content_downloaded",
            Self::AnomaliesProcessed => "anomalies_processed",
            Self::ResponseBuilt => "response_built",
            Self::ContinuationApplied => "continuation_applied",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a stage from its database string representation
    ///
    /// Returns None if the string doesn't match any known stage.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "validated" => Some(Self::Validated),
            "page_loaded" => Some(Self::PageLoaded),
            "extracted" => Some(Self::Extracted),
            "content_downloaded" => Some(Self::ContentDownloaded),
            "anomalies_processed" => Some(Self::AnomaliesProcessed),
            "response_built" => Some(Self::ResponseBuilt),
            "continuation_applied" => Some(Self::ContinuationApplied),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validated => "Validated",
            Self::PageLoaded => "PageLoaded",
            Self::Extracted => "Extracted",
            Self::ContentDownloaded => "ContentDownloaded",
            Self::AnomaliesProcessed => "AnomaliesProcessed",
            Self::ResponseBuilt => "ResponseBuilt",
            Self::ContinuationApplied => "ContinuationApplied",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}
