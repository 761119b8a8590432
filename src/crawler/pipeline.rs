//! The crawl pipeline
//!
//! A [`CrawlerStrategy`] turns one validated request into a response by
//! walking the stages of [`CrawlStage`] in order. The generic strategy
//! below is the default for every host; site-specific strategies plug in
//! through the strategy mapper.

use crate::continuation::ContinuationStrategy;
use crate::crawler::loader::{DownloadRequest, Downloader, PageLoader};
use crate::crawler::request::{CrawlRequest, CrawlResponse, Document, LoadPageRequest};
use crate::crawler::stage::CrawlStage;
use crate::document::{DocumentPart, File, FileData, Link};
use crate::extract::{parse, parse_html, Anomaly};
use crate::metrics::MetricsSink;
use crate::throttle::{RequestManagerFactory, ThrottleContext, ThrottleError};
use crate::url::extract_domain;
use crate::{CrawlError, CrawlErrorKind};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Runs a crawl from validation through continuation
#[async_trait]
pub trait CrawlerStrategy: Send + Sync {
    /// Name used in logs and routing diagnostics
    fn name(&self) -> &str;

    /// Crawls one request
    ///
    /// # Arguments
    ///
    /// * `request` - The crawl to perform
    /// * `continuation` - Applied to the finished response, if any
    /// * `cancel` - Aborts throttle waits, page loads and downloads
    async fn crawl(
        &self,
        request: &CrawlRequest,
        continuation: Option<&dyn ContinuationStrategy>,
        cancel: &CancellationToken,
    ) -> Result<CrawlResponse, CrawlError>;
}

/// Host and correlation id attached to every failure of one crawl
#[derive(Debug, Clone, Default)]
struct FailureContext {
    host: Option<String>,
    correlation_id: Option<String>,
}

impl FailureContext {
    fn fail(&self, stage: CrawlStage, kind: CrawlErrorKind) -> CrawlError {
        let mut error = CrawlError::new(stage, kind);
        error.host = self.host.clone();
        error.correlation_id = self.correlation_id.clone();
        error
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> CrawlError {
        self.fail(
            CrawlStage::Validated,
            CrawlErrorKind::RequestValidation {
                field,
                reason: reason.into(),
            },
        )
    }

    fn check_cancelled(&self, stage: CrawlStage, cancel: &CancellationToken) -> Result<(), CrawlError> {
        if cancel.is_cancelled() {
            return Err(self.fail(stage, CrawlErrorKind::Cancelled));
        }
        Ok(())
    }
}

/// What validation guarantees the rest of the pipeline
struct Validated<'a> {
    uri: Url,
    host: String,
    load: &'a LoadPageRequest,
    document: &'a Document,
    definition: &'a DocumentPart,
}

/// Load, extract, download, report, respond, continue
pub struct GenericCrawlerStrategy {
    loader: Arc<dyn PageLoader>,
    downloader: Arc<dyn Downloader>,
    throttles: Arc<RequestManagerFactory>,
    metrics: Arc<dyn MetricsSink>,
}

impl GenericCrawlerStrategy {
    pub fn new(
        loader: Arc<dyn PageLoader>,
        downloader: Arc<dyn Downloader>,
        throttles: Arc<RequestManagerFactory>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            loader,
            downloader,
            throttles,
            metrics,
        }
    }

    fn validate<'a>(
        &self,
        request: &'a CrawlRequest,
        ctx: &mut FailureContext,
    ) -> Result<Validated<'a>, CrawlError> {
        let load = request
            .load_page_request
            .as_ref()
            .ok_or_else(|| ctx.invalid("load_page_request", "missing"))?;
        ctx.correlation_id = Some(load.correlation_id.clone());

        if load.uri.trim().is_empty() {
            return Err(ctx.invalid("uri", "missing"));
        }
        let uri = Url::parse(load.uri.trim()).map_err(|e| ctx.invalid("uri", e.to_string()))?;
        let host = extract_domain(&uri)
            .ok_or_else(|| ctx.invalid("uri", format!("'{}' has no host", uri)))?;
        ctx.host = Some(host.clone());

        let document = request
            .request_document
            .as_ref()
            .ok_or_else(|| ctx.invalid("request_document", "missing"))?;
        let definition = document
            .part
            .as_ref()
            .ok_or_else(|| ctx.invalid("definition", "missing"))?;

        Ok(Validated {
            uri,
            host,
            load,
            document,
            definition,
        })
    }

    /// Downloads every File's links in parallel and fills in its data list
    ///
    /// A failed download leaves `None` at that link's position; only
    /// cancellation fails the stage.
    async fn download_content(
        &self,
        root: &mut DocumentPart,
        correlation_id: &str,
        ctx: &FailureContext,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        let targets: Vec<Vec<Option<Url>>> = root
            .all::<File>()
            .into_iter()
            .map(|file| {
                file.download_links
                    .iter()
                    .map(|link| link.get::<Link>().and_then(|l| l.uri.clone()))
                    .collect()
            })
            .collect();

        let total: usize = targets.iter().map(Vec::len).sum();
        if total == 0 {
            tracing::debug!("No files to download");
            return Ok(());
        }
        tracing::debug!("Downloading {} file(s)", total);

        let downloads = targets
            .iter()
            .flatten()
            .map(|uri| self.download_one(uri.as_ref(), correlation_id, cancel));
        let mut results = join_all(downloads).await.into_iter();

        let mut data: Vec<Vec<Option<FileData>>> = Vec::with_capacity(targets.len());
        for links in &targets {
            let mut list = Vec::with_capacity(links.len());
            for _ in links {
                match results.next() {
                    Some(Ok(file_data)) => list.push(file_data),
                    Some(Err(e)) => return Err(ctx.fail(CrawlStage::ContentDownloaded, e)),
                    None => list.push(None),
                }
            }
            data.push(list);
        }

        for (file, list) in root.files_mut().into_iter().zip(data) {
            file.file_data_list = list;
        }
        Ok(())
    }

    async fn download_one(
        &self,
        uri: Option<&Url>,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<FileData>, CrawlErrorKind> {
        let Some(uri) = uri else {
            return Ok(None);
        };
        let Some(host) = extract_domain(uri) else {
            tracing::warn!("Skipping download of {}: no host", uri);
            return Ok(None);
        };

        let request = DownloadRequest {
            uri: uri.clone(),
            correlation_id: correlation_id.to_string(),
        };
        let manager = self.throttles.manager_for(&host);

        match manager
            .throttle_download(cancel, self.downloader.download(&request))
            .await
        {
            Ok(downloaded) => Ok(Some(FileData {
                uri: uri.clone(),
                content_type: downloaded.content_type,
                bytes: downloaded.bytes,
            })),
            Err(ThrottleError::Cancelled { .. }) => Err(CrawlErrorKind::Cancelled),
            Err(e) => {
                tracing::warn!("Download of {} failed: {}", uri, e);
                Ok(None)
            }
        }
    }

    fn report(&self, uri: &Url, anomalies: &[Anomaly]) {
        for anomaly in anomalies {
            tracing::warn!("Anomaly on {}: {}", uri, anomaly);
            self.metrics.increment_anomaly_count(anomaly.kind);
        }
    }
}

/// Maps a page-load throttle failure onto the crawl error taxonomy
fn page_load_error(error: ThrottleError) -> CrawlErrorKind {
    match error {
        ThrottleError::Action {
            context: ThrottleContext::Request,
            source,
            ..
        } => CrawlErrorKind::PageLoad(source.to_string()),
        ThrottleError::Cancelled { .. } => CrawlErrorKind::Cancelled,
        other => CrawlErrorKind::Throttle(other),
    }
}

#[async_trait]
impl CrawlerStrategy for GenericCrawlerStrategy {
    fn name(&self) -> &str {
        "generic"
    }

    async fn crawl(
        &self,
        request: &CrawlRequest,
        continuation: Option<&dyn ContinuationStrategy>,
        cancel: &CancellationToken,
    ) -> Result<CrawlResponse, CrawlError> {
        let mut ctx = FailureContext::default();
        let valid = self.validate(request, &mut ctx)?;
        tracing::debug!("Validated crawl {} of {}", request.crawl_id, valid.uri);

        // PageLoaded
        ctx.check_cancelled(CrawlStage::PageLoaded, cancel)?;
        let manager = self.throttles.manager_for(&valid.host);
        let source = manager
            .throttle_request(cancel, self.loader.load_page(valid.load))
            .await
            .map_err(|e| ctx.fail(CrawlStage::PageLoaded, page_load_error(e)))?;
        tracing::debug!("Loaded {} ({} bytes)", valid.uri, source.len());

        // Extracted; the parsed document must not live across an await
        let extraction = {
            let html = parse_html(&source);
            parse(valid.definition, &html, &valid.uri)
        };
        let mut root = extraction.result.ok_or_else(|| {
            ctx.fail(
                CrawlStage::Extracted,
                CrawlErrorKind::Extraction(format!(
                    "root definition {} matched nothing",
                    valid.definition.label()
                )),
            )
        })?;
        tracing::debug!(
            "Extracted {} part(s) with {} anomalies",
            root.walk().len(),
            extraction.anomalies.len()
        );

        // ContentDownloaded
        if valid.document.download_content {
            ctx.check_cancelled(CrawlStage::ContentDownloaded, cancel)?;
            self.download_content(&mut root, &valid.load.correlation_id, &ctx, cancel)
                .await?;
        }

        // AnomaliesProcessed
        self.report(&valid.uri, &extraction.anomalies);

        // ResponseBuilt
        let response = CrawlResponse {
            crawler_id: request.id,
            crawl_id: request.crawl_id,
            correlation_id: valid.load.correlation_id.clone(),
            uri: valid.uri.clone(),
            result: Document {
                part: Some(root),
                download_content: valid.document.download_content,
                provide_raw: valid.document.provide_raw,
            },
            raw: valid.document.provide_raw.then_some(source),
            anomalies: extraction.anomalies,
        };

        // ContinuationApplied
        if let Some(continuation) = continuation {
            ctx.check_cancelled(CrawlStage::ContinuationApplied, cancel)?;
            let scheduled = continuation
                .apply(&response)
                .await
                .map_err(|e| ctx.fail(CrawlStage::ContinuationApplied, e.into()))?;
            tracing::debug!(
                "Continuation {} scheduled {} link(s)",
                continuation.kind(),
                scheduled
            );
        }

        tracing::info!("Crawled {} ({})", response.uri, response.correlation_id);
        Ok(response)
    }
}
