//! Strategy routing
//!
//! Picks the crawler strategy and the continuation strategy for a target
//! URI. Crawling always falls back to the default strategy; a `custom`
//! continuation with no configured route is an error.

mod routes;

pub use routes::{RouteKey, RouteTable};

use crate::config::Config;
use crate::continuation::{
    AllLinks, ContinuationError, ContinuationKind, ContinuationStrategy, DomainOnly,
    FilteredContinuation, TrackLinksOnly,
};
use crate::crawler::CrawlerStrategy;
use crate::storage::LinkScheduler;
use std::sync::Arc;
use url::Url;

/// Immutable routing snapshot, built once at startup
pub struct StrategyMapper {
    default_strategy: Arc<dyn CrawlerStrategy>,
    strategies: RouteTable<Arc<dyn CrawlerStrategy>>,
    custom: RouteTable<Arc<dyn ContinuationStrategy>>,
    all: Arc<dyn ContinuationStrategy>,
    domain_only: Arc<dyn ContinuationStrategy>,
    track_links_only: Arc<dyn ContinuationStrategy>,
}

impl StrategyMapper {
    /// Creates a mapper with no routes
    ///
    /// # Arguments
    ///
    /// * `default_strategy` - Used for every URI without a crawler route
    /// * `scheduler` - Receives links from the built-in continuations
    pub fn new(default_strategy: Arc<dyn CrawlerStrategy>, scheduler: Arc<dyn LinkScheduler>) -> Self {
        Self {
            default_strategy,
            strategies: RouteTable::new(),
            custom: RouteTable::new(),
            all: Arc::new(AllLinks::new(scheduler.clone())),
            domain_only: Arc::new(DomainOnly::new(scheduler.clone())),
            track_links_only: Arc::new(TrackLinksOnly::new(scheduler)),
        }
    }

    /// Creates a mapper with the custom continuations declared in `config`
    pub fn from_config(
        config: &Config,
        default_strategy: Arc<dyn CrawlerStrategy>,
        scheduler: Arc<dyn LinkScheduler>,
    ) -> Self {
        let mut mapper = Self::new(default_strategy, scheduler.clone());
        for entry in &config.continuations {
            if let Some(key) = entry.key() {
                mapper = mapper.with_continuation(
                    key,
                    Arc::new(FilteredContinuation::new(entry.allow.clone(), scheduler.clone())),
                );
            }
        }
        tracing::debug!("Loaded {} custom continuation route(s)", mapper.custom.len());
        mapper
    }

    /// Routes a URI or host to a crawler strategy
    pub fn with_strategy(mut self, key: RouteKey, strategy: Arc<dyn CrawlerStrategy>) -> Self {
        self.strategies.insert(key, strategy);
        self
    }

    /// Routes a URI or host to a custom continuation
    pub fn with_continuation(mut self, key: RouteKey, continuation: Arc<dyn ContinuationStrategy>) -> Self {
        self.custom.insert(key, continuation);
        self
    }

    /// The crawler strategy for `uri`: exact URI, then host, then default
    pub fn crawler_strategy(&self, uri: Option<&Url>) -> Arc<dyn CrawlerStrategy> {
        uri.and_then(|uri| self.strategies.resolve(uri))
            .unwrap_or(&self.default_strategy)
            .clone()
    }

    /// The continuation strategy for a request
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The request asks for no continuation
    /// * `Ok(Some(_))` - The built-in or configured strategy
    /// * `Err(ContinuationError::UnmappedCustom)` - `custom` was requested
    ///   but nothing is routed to `uri`
    pub fn continuation_strategy(
        &self,
        kind: ContinuationKind,
        uri: Option<&Url>,
    ) -> Result<Option<Arc<dyn ContinuationStrategy>>, ContinuationError> {
        let strategy = match kind {
            ContinuationKind::None => return Ok(None),
            ContinuationKind::All => self.all.clone(),
            ContinuationKind::DomainOnly => self.domain_only.clone(),
            ContinuationKind::TrackLinksOnly => self.track_links_only.clone(),
            ContinuationKind::Custom => uri
                .and_then(|uri| self.custom.resolve(uri))
                .cloned()
                .ok_or_else(|| ContinuationError::UnmappedCustom {
                    uri: uri.map(|u| u.to_string()).unwrap_or_default(),
                })?,
        };
        Ok(Some(strategy))
    }
}
