//! Continuation strategies
//!
//! After a crawl succeeds, its continuation strategy decides which of the
//! discovered links become future crawls and hands them to a
//! [`LinkScheduler`]. A link already known to the scheduler is skipped, so
//! re-crawling a page never schedules its links twice.

mod strategies;

pub use strategies::{AllLinks, DomainOnly, FilteredContinuation, NoContinuation, TrackLinksOnly};

use crate::crawler::CrawlResponse;
use crate::storage::{LinkScheduler, StorageError, UriRecord};
use crate::url::extract_domain;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

/// Which continuation a request asks for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuationKind {
    /// Schedule nothing
    #[default]
    None,
    /// Every link, plus downloads of an auto-detected page
    All,
    /// Links on the crawled page's host
    DomainOnly,
    /// Every Link part, whatever the root
    TrackLinksOnly,
    /// A configured strategy looked up by URI or host
    Custom,
}

impl ContinuationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::All => "all",
            Self::DomainOnly => "domain-only",
            Self::TrackLinksOnly => "track-links-only",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ContinuationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Continuation failures; each one fails the crawl
#[derive(Debug, Error)]
pub enum ContinuationError {
    #[error("could not schedule links: {0}")]
    Storage(#[from] StorageError),

    #[error("no custom continuation is configured for {uri}")]
    UnmappedCustom { uri: String },

    #[error("response has no base host to compare links against")]
    MissingBaseHost,
}

/// Decides which links of a finished crawl are crawled next
#[async_trait]
pub trait ContinuationStrategy: Send + Sync {
    fn kind(&self) -> ContinuationKind;

    /// The links this strategy would schedule, in result-tree order
    fn harvest(&self, response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError>;

    /// Schedules the harvested links
    ///
    /// # Returns
    ///
    /// The number of links that were new to the scheduler.
    async fn apply(&self, response: &CrawlResponse) -> Result<usize, ContinuationError>;
}

/// Adds every link the scheduler doesn't know yet
///
/// Duplicates are detected by exact string comparison of the URI.
pub(crate) async fn schedule(
    scheduler: &dyn LinkScheduler,
    response: &CrawlResponse,
    links: Vec<Url>,
) -> Result<usize, ContinuationError> {
    let harvested = links.len();
    let mut added = 0;

    for link in links {
        if scheduler.uri_link_exists(link.as_str()).await? {
            tracing::debug!("Already scheduled: {}", link);
            continue;
        }

        let record = UriRecord {
            host: extract_domain(&link).unwrap_or_default(),
            uri: link.to_string(),
            source_uri: response.uri.to_string(),
            correlation_id: response.correlation_id.clone(),
            crawl_id: response.crawl_id,
            discovered_at: Utc::now(),
        };
        scheduler.add(record).await?;
        added += 1;
    }

    tracing::info!(
        "Scheduled {} new link(s) of {} harvested from {}",
        added,
        harvested,
        response.uri
    );
    Ok(added)
}
