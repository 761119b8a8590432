//! Built-in continuation strategies

use crate::continuation::{schedule, ContinuationError, ContinuationKind, ContinuationStrategy};
use crate::crawler::CrawlResponse;
use crate::document::{DocumentPart, PartKind};
use crate::storage::LinkScheduler;
use crate::url::matches_wildcard;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Schedules nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContinuation;

#[async_trait]
impl ContinuationStrategy for NoContinuation {
    fn kind(&self) -> ContinuationKind {
        ContinuationKind::None
    }

    fn harvest(&self, _response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError> {
        Ok(Vec::new())
    }

    async fn apply(&self, _response: &CrawlResponse) -> Result<usize, ContinuationError> {
        Ok(0)
    }
}

/// Every Link in the result; an auto-detected page also yields its downloads
pub struct AllLinks {
    scheduler: Arc<dyn LinkScheduler>,
}

impl AllLinks {
    pub fn new(scheduler: Arc<dyn LinkScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ContinuationStrategy for AllLinks {
    fn kind(&self) -> ContinuationKind {
        ContinuationKind::All
    }

    fn harvest(&self, response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError> {
        Ok(harvest_all(response))
    }

    async fn apply(&self, response: &CrawlResponse) -> Result<usize, ContinuationError> {
        schedule(self.scheduler.as_ref(), response, self.harvest(response)?).await
    }
}

/// Links whose URI mentions the crawled page's host
///
/// The match is a case-insensitive substring test, so subdomains and
/// URIs carrying the host in their path or query match too.
pub struct DomainOnly {
    scheduler: Arc<dyn LinkScheduler>,
}

impl DomainOnly {
    pub fn new(scheduler: Arc<dyn LinkScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ContinuationStrategy for DomainOnly {
    fn kind(&self) -> ContinuationKind {
        ContinuationKind::DomainOnly
    }

    fn harvest(&self, response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError> {
        let host = response
            .base_host()
            .ok_or(ContinuationError::MissingBaseHost)?;

        Ok(harvest_all(response)
            .into_iter()
            .filter(|link| link.as_str().to_lowercase().contains(&host))
            .collect())
    }

    async fn apply(&self, response: &CrawlResponse) -> Result<usize, ContinuationError> {
        schedule(self.scheduler.as_ref(), response, self.harvest(response)?).await
    }
}

/// Every Link part, never downloads
pub struct TrackLinksOnly {
    scheduler: Arc<dyn LinkScheduler>,
}

impl TrackLinksOnly {
    pub fn new(scheduler: Arc<dyn LinkScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl ContinuationStrategy for TrackLinksOnly {
    fn kind(&self) -> ContinuationKind {
        ContinuationKind::TrackLinksOnly
    }

    fn harvest(&self, response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError> {
        Ok(response
            .root()
            .map(|root| link_uris(root, false))
            .unwrap_or_default())
    }

    async fn apply(&self, response: &CrawlResponse) -> Result<usize, ContinuationError> {
        schedule(self.scheduler.as_ref(), response, self.harvest(response)?).await
    }
}

/// A configured custom continuation: the All harvest restricted to hosts
/// matching an allow list
pub struct FilteredContinuation {
    allow: Vec<String>,
    scheduler: Arc<dyn LinkScheduler>,
}

impl FilteredContinuation {
    /// # Arguments
    ///
    /// * `allow` - Host patterns, exact or `*.`-prefixed
    /// * `scheduler` - Where harvested links go
    pub fn new(allow: Vec<String>, scheduler: Arc<dyn LinkScheduler>) -> Self {
        Self { allow, scheduler }
    }

    pub fn allow(&self) -> &[String] {
        &self.allow
    }
}

#[async_trait]
impl ContinuationStrategy for FilteredContinuation {
    fn kind(&self) -> ContinuationKind {
        ContinuationKind::Custom
    }

    fn harvest(&self, response: &CrawlResponse) -> Result<Vec<Url>, ContinuationError> {
        Ok(harvest_all(response)
            .into_iter()
            .filter(|link| {
                link.host_str()
                    .map(|host| self.allow.iter().any(|p| matches_wildcard(p, host)))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn apply(&self, response: &CrawlResponse) -> Result<usize, ContinuationError> {
        schedule(self.scheduler.as_ref(), response, self.harvest(response)?).await
    }
}

fn harvest_all(response: &CrawlResponse) -> Vec<Url> {
    match response.root() {
        Some(root) => link_uris(root, root.kind() == PartKind::AutoDetect),
        None => Vec::new(),
    }
}

fn link_uris(root: &DocumentPart, include_downloads: bool) -> Vec<Url> {
    root.links(include_downloads)
        .into_iter()
        .filter_map(|link| link.uri.clone())
        .collect()
}
