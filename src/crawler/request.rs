//! Crawl request and response types

use crate::continuation::{ContinuationKind, ContinuationStrategy};
use crate::crawler::pipeline::CrawlerStrategy;
use crate::document::DocumentPart;
use crate::extract::Anomaly;
use crate::url::extract_domain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// An interaction performed by a browser-backed page loader before the
/// page source is captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum UiAction {
    Input { selector: String, value: String },
    Click { selector: String },
    Select { selector: String, value: String },
    Wait { millis: u64 },
    Scroll { pixels: i64 },
}

/// What to load and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadPageRequest {
    /// The target URI
    pub uri: String,

    pub correlation_id: String,

    /// Actions to perform before extraction, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<UiAction>,
}

/// A document-part tree plus the flags that govern its crawl
///
/// In a request `part` is the definition; in a response it is the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<DocumentPart>,

    /// Download every File's links after extraction
    #[serde(default)]
    pub download_content: bool,

    /// Echo the raw page source in the response
    #[serde(default)]
    pub provide_raw: bool,
}

impl Document {
    pub fn new(part: DocumentPart) -> Self {
        Self {
            part: Some(part),
            download_content: false,
            provide_raw: false,
        }
    }
}

/// One crawl to perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlRequest {
    pub id: Uuid,
    pub crawl_id: Uuid,

    /// The crawl that discovered this request's target, if any
    #[serde(default)]
    pub correlation_crawl_id: Option<Uuid>,

    #[serde(default)]
    pub continuation: ContinuationKind,

    pub load_page_request: Option<LoadPageRequest>,
    pub request_document: Option<Document>,

    /// Populated on the copy carried by a failure record
    #[serde(default)]
    pub error: Option<String>,
}

impl CrawlRequest {
    /// Creates a request with fresh ids and no continuation
    ///
    /// # Arguments
    ///
    /// * `uri` - The page to crawl
    /// * `definition` - The root of the extraction definition
    pub fn new(uri: impl Into<String>, definition: Option<DocumentPart>) -> Self {
        Self {
            id: Uuid::new_v4(),
            crawl_id: Uuid::new_v4(),
            correlation_crawl_id: None,
            continuation: ContinuationKind::None,
            load_page_request: Some(LoadPageRequest {
                uri: uri.into(),
                correlation_id: Uuid::new_v4().to_string(),
                actions: Vec::new(),
            }),
            request_document: Some(Document {
                part: definition,
                download_content: false,
                provide_raw: false,
            }),
            error: None,
        }
    }

    pub fn with_continuation(mut self, continuation: ContinuationKind) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_download_content(mut self, download_content: bool) -> Self {
        if let Some(document) = self.request_document.as_mut() {
            document.download_content = download_content;
        }
        self
    }

    pub fn with_provide_raw(mut self, provide_raw: bool) -> Self {
        if let Some(document) = self.request_document.as_mut() {
            document.provide_raw = provide_raw;
        }
        self
    }

    /// The target URI, if present and parseable
    pub fn target(&self) -> Option<Url> {
        self.load_page_request
            .as_ref()
            .and_then(|load| Url::parse(load.uri.trim()).ok())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.load_page_request
            .as_ref()
            .map(|load| load.correlation_id.as_str())
    }
}

/// The outcome of a successful crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlResponse {
    /// Id of the request that produced this response
    pub crawler_id: Uuid,

    pub crawl_id: Uuid,
    pub correlation_id: String,

    /// The crawled page
    pub uri: Url,

    /// The result tree, wrapped like the request's document
    pub result: Document,

    /// Page source, present only when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    /// Anomalies recorded during extraction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
}

impl CrawlResponse {
    /// The root of the result tree
    pub fn root(&self) -> Option<&DocumentPart> {
        self.result.part.as_ref()
    }

    /// Host links in this response are measured against: the root's base
    /// URI, else the crawled page
    pub fn base_host(&self) -> Option<String> {
        let base = self
            .root()
            .and_then(|root| root.base_uri.as_ref())
            .unwrap_or(&self.uri);
        extract_domain(base)
    }
}

/// Everything [`Crawler::crawl`](crate::Crawler::crawl) needs
///
/// Strategies left unset are resolved by the crawler's strategy mapper.
#[derive(Clone, Default)]
pub struct Request {
    pub crawl_request: Option<CrawlRequest>,
    pub strategy: Option<Arc<dyn CrawlerStrategy>>,
    pub continuation: Option<Arc<dyn ContinuationStrategy>>,
}

impl Request {
    pub fn new(crawl_request: CrawlRequest) -> Self {
        Self {
            crawl_request: Some(crawl_request),
            strategy: None,
            continuation: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn CrawlerStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_continuation(mut self, continuation: Arc<dyn ContinuationStrategy>) -> Self {
        self.continuation = Some(continuation);
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("crawl_request", &self.crawl_request)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name().to_string()))
            .field("continuation", &self.continuation.as_ref().map(|c| c.kind()))
            .finish()
    }
}
