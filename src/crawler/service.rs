//! The crawl entry point

use crate::crawler::request::{CrawlResponse, Request};
use crate::crawler::stage::CrawlStage;
use crate::mapper::StrategyMapper;
use crate::publish::{CrawlFailure, FailurePublisher};
use crate::url::extract_domain;
use crate::{CrawlError, CrawlErrorKind};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Routes requests to their strategies and publishes every failure
pub struct Crawler {
    mapper: StrategyMapper,
    publisher: Arc<dyn FailurePublisher>,
}

impl Crawler {
    pub fn new(mapper: StrategyMapper, publisher: Arc<dyn FailurePublisher>) -> Self {
        Self { mapper, publisher }
    }

    pub fn mapper(&self) -> &StrategyMapper {
        &self.mapper
    }

    /// Crawls one request
    ///
    /// Strategies the request leaves unset are resolved through the mapper.
    /// A failed crawl is published as a [`CrawlFailure`] before the error
    /// is returned.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResponse)` - Every stage completed
    /// * `Err(CrawlError)` - The crawl failed; if the failure record could
    ///   not be published either, the error kind is `Publish`
    pub async fn crawl(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<CrawlResponse, CrawlError> {
        let Some(crawl_request) = request.crawl_request.as_ref() else {
            let error = CrawlError::new(
                CrawlStage::Validated,
                CrawlErrorKind::RequestValidation {
                    field: "crawl_request",
                    reason: "missing".to_string(),
                },
            );
            return Err(self.fail(&request, error).await);
        };

        let target = crawl_request.target();
        let strategy = request
            .strategy
            .clone()
            .unwrap_or_else(|| self.mapper.crawler_strategy(target.as_ref()));

        let continuation = match request.continuation.clone() {
            Some(continuation) => Some(continuation),
            None => match self
                .mapper
                .continuation_strategy(crawl_request.continuation, target.as_ref())
            {
                Ok(continuation) => continuation,
                Err(e) => {
                    let mut error = CrawlError::new(CrawlStage::Validated, e.into());
                    error.host = target.as_ref().and_then(extract_domain);
                    error.correlation_id = crawl_request.correlation_id().map(str::to_string);
                    return Err(self.fail(&request, error).await);
                }
            },
        };

        tracing::debug!(
            "Crawling {} with strategy '{}' (continuation: {})",
            target.as_ref().map(|t| t.as_str()).unwrap_or("-"),
            strategy.name(),
            continuation
                .as_ref()
                .map(|c| c.kind().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        match strategy
            .crawl(crawl_request, continuation.as_deref(), cancel)
            .await
        {
            Ok(response) => Ok(response),
            Err(error) => Err(self.fail(&request, error).await),
        }
    }

    /// Publishes the failure record for `error` and hands back the error
    /// the caller should see
    async fn fail(&self, request: &Request, error: CrawlError) -> CrawlError {
        let failure = CrawlFailure::new(request.crawl_request.as_ref(), &error);

        match self.publisher.publish(&failure).await {
            Ok(()) => error,
            Err(publish_error) => {
                tracing::error!(
                    "Could not publish failure {} ({}): {}",
                    failure.id,
                    error,
                    publish_error
                );
                CrawlError {
                    stage: error.stage,
                    host: error.host,
                    correlation_id: error.correlation_id,
                    kind: CrawlErrorKind::Publish(publish_error.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::{ContinuationKind, ContinuationStrategy};
    use crate::crawler::CrawlRequest;
    use crate::crawler::CrawlerStrategy;
    use crate::document::DocumentPart;
    use crate::publish::{InMemoryFailurePublisher, PublishError};
    use crate::storage::InMemoryLinkStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every crawl at the page-load stage
    #[derive(Default)]
    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CrawlerStrategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn crawl(
            &self,
            request: &CrawlRequest,
            _continuation: Option<&dyn ContinuationStrategy>,
            _cancel: &CancellationToken,
        ) -> Result<CrawlResponse, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut error = CrawlError::new(
                CrawlStage::PageLoaded,
                CrawlErrorKind::PageLoad("connection reset".to_string()),
            )
            .with_host("example.com");
            error.correlation_id = request.correlation_id().map(str::to_string);
            Err(error)
        }
    }

    struct BrokenPublisher;

    #[async_trait]
    impl FailurePublisher for BrokenPublisher {
        async fn publish(&self, _failure: &CrawlFailure) -> Result<(), PublishError> {
            Err(PublishError::Unavailable("queue down".to_string()))
        }
    }

    fn crawler(strategy: Arc<Failing>, publisher: Arc<dyn FailurePublisher>) -> Crawler {
        let mapper = StrategyMapper::new(strategy, Arc::new(InMemoryLinkStore::new()));
        Crawler::new(mapper, publisher)
    }

    fn request(continuation: ContinuationKind) -> CrawlRequest {
        CrawlRequest::new("https://example.com/", Some(DocumentPart::auto_detect()))
            .with_continuation(continuation)
    }

    #[tokio::test]
    async fn test_failure_is_published() {
        let strategy = Arc::new(Failing::default());
        let publisher = Arc::new(InMemoryFailurePublisher::new());
        let crawler = crawler(strategy.clone(), publisher.clone());
        let crawl_request = request(ContinuationKind::None);

        let err = crawler
            .crawl(Request::new(crawl_request.clone()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage, CrawlStage::PageLoaded);
        let failures = publisher.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].crawler_id, Some(crawl_request.id));
        assert_eq!(failures[0].kind, "page_load");
        assert_eq!(
            failures[0].correlation_id.as_deref(),
            crawl_request.correlation_id()
        );
        let echoed = failures[0].request.as_ref().unwrap();
        assert_eq!(echoed.id, crawl_request.id);
        assert!(echoed.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_crawl_request() {
        let publisher = Arc::new(InMemoryFailurePublisher::new());
        let crawler = crawler(Arc::new(Failing::default()), publisher.clone());

        let err = crawler
            .crawl(Request::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err.kind,
            CrawlErrorKind::RequestValidation { field: "crawl_request", .. }
        ));
        assert_eq!(publisher.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_unmapped_custom_fails_before_crawling() {
        let strategy = Arc::new(Failing::default());
        let publisher = Arc::new(InMemoryFailurePublisher::new());
        let crawler = crawler(strategy.clone(), publisher.clone());

        let err = crawler
            .crawl(
                Request::new(request(ContinuationKind::Custom)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage, CrawlStage::Validated);
        assert!(matches!(err.kind, CrawlErrorKind::Continuation(_)));
        assert_eq!(err.host.as_deref(), Some("example.com"));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
        assert_eq!(publisher.failures()[0].kind, "continuation");
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces() {
        let crawler = crawler(Arc::new(Failing::default()), Arc::new(BrokenPublisher));

        let err = crawler
            .crawl(
                Request::new(request(ContinuationKind::None)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage, CrawlStage::PageLoaded);
        assert_eq!(err.host.as_deref(), Some("example.com"));
        assert!(matches!(err.kind, CrawlErrorKind::Publish(_)));
    }

    #[tokio::test]
    async fn test_request_strategy_overrides_mapper() {
        let routed = Arc::new(Failing::default());
        let explicit = Arc::new(Failing::default());
        let crawler = crawler(routed.clone(), Arc::new(InMemoryFailurePublisher::new()));

        let request = Request::new(request(ContinuationKind::None)).with_strategy(explicit.clone());
        let _ = crawler.crawl(request, &CancellationToken::new()).await;

        assert_eq!(routed.calls.load(Ordering::SeqCst), 0);
        assert_eq!(explicit.calls.load(Ordering::SeqCst), 1);
    }
}
