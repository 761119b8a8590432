use crate::continuation::ContinuationKind;
use crate::crawler::CrawlRequest;
use crate::document::DocumentPart;
use crate::mapper::{RouteKey, RouteTable};
use crate::throttle::ThrottleSettings;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteConfig>,
    #[serde(default, rename = "continuation")]
    pub continuations: Vec<ContinuationConfig>,
}

/// Crawler pacing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Lower bound of the wait between requests to one host (seconds)
    #[serde(default = "default_min_throttle_secs")]
    pub min_throttle_secs: u64,

    /// Upper bound of the wait between requests to one host (seconds)
    #[serde(default = "default_max_throttle_secs")]
    pub max_throttle_secs: u64,

    /// Polls of a busy download slot before giving up
    #[serde(default = "default_download_recursion_threshold")]
    pub download_recursion_threshold: u32,

    /// Whole-request timeout for page loads and downloads (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_min_throttle_secs() -> u64 {
    3
}

fn default_max_throttle_secs() -> u64 {
    10
}

fn default_download_recursion_threshold() -> u32 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            min_throttle_secs: default_min_throttle_secs(),
            max_throttle_secs: default_max_throttle_secs(),
            download_recursion_threshold: default_download_recursion_threshold(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CrawlerConfig {
    pub fn throttle_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            min_wait: Duration::from_secs(self.min_throttle_secs),
            max_wait: Duration::from_secs(self.max_throttle_secs),
            download_recursion_threshold: self.download_recursion_threshold,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// `Name/Version (+contact-url; contact-email)`
    pub fn user_agent_string(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database holding scheduled links and failures
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "./harvest.db".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// The request document used when no route overrides it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentConfig {
    #[serde(default)]
    pub download_content: bool,

    #[serde(default)]
    pub provide_raw: bool,

    #[serde(default)]
    pub continuation: ContinuationKind,

    /// Root of the definition tree; auto-detect when omitted
    #[serde(default = "DocumentPart::auto_detect")]
    pub definition: DocumentPart,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            download_content: false,
            provide_raw: false,
            continuation: ContinuationKind::None,
            definition: DocumentPart::auto_detect(),
        }
    }
}

/// Per-URI or per-host override of the document template
///
/// Fields left out fall back to `[document]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RouteConfig {
    pub uri: Option<String>,
    pub host: Option<String>,
    pub continuation: Option<ContinuationKind>,
    pub definition: Option<DocumentPart>,
    pub download_content: Option<bool>,
    pub provide_raw: Option<bool>,
}

impl RouteConfig {
    /// The route's key, when exactly one of `uri` / `host` is set
    pub fn key(&self) -> Option<RouteKey> {
        route_key(&self.uri, &self.host)
    }

    fn apply(&self, base: &DocumentConfig) -> DocumentConfig {
        DocumentConfig {
            download_content: self.download_content.unwrap_or(base.download_content),
            provide_raw: self.provide_raw.unwrap_or(base.provide_raw),
            continuation: self.continuation.unwrap_or(base.continuation),
            definition: self
                .definition
                .clone()
                .unwrap_or_else(|| base.definition.clone()),
        }
    }
}

/// A custom continuation: harvest every link, keep allowed hosts
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContinuationConfig {
    pub uri: Option<String>,
    pub host: Option<String>,

    /// Host patterns whose links are scheduled
    #[serde(default)]
    pub allow: Vec<String>,
}

impl ContinuationConfig {
    pub fn key(&self) -> Option<RouteKey> {
        route_key(&self.uri, &self.host)
    }
}

fn route_key(uri: &Option<String>, host: &Option<String>) -> Option<RouteKey> {
    match (uri, host) {
        (Some(uri), None) => Some(RouteKey::Uri(uri.clone())),
        (None, Some(host)) => Some(RouteKey::Host(host.clone())),
        _ => None,
    }
}

impl Config {
    /// The document template for `uri`
    ///
    /// An exact `uri` route wins over `host` routes; among host routes the
    /// first listed match wins.
    pub fn document_for(&self, uri: &Url) -> DocumentConfig {
        let mut table = RouteTable::new();
        for route in &self.routes {
            if let Some(key) = route.key() {
                table.insert(key, route);
            }
        }

        match table.resolve(uri) {
            Some(route) => route.apply(&self.document),
            None => self.document.clone(),
        }
    }

    /// Builds a fresh crawl request for `uri` from its document template
    pub fn crawl_request(&self, uri: &Url) -> CrawlRequest {
        let template = self.document_for(uri);
        CrawlRequest::new(uri.as_str(), Some(template.definition))
            .with_continuation(template.continuation)
            .with_download_content(template.download_content)
            .with_provide_raw(template.provide_raw)
    }
}
