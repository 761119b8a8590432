//! Crawler module: requests, the crawl pipeline and its collaborators
//!
//! This module contains:
//! - Request and response types, and the stages a crawl moves through
//! - Page loading and downloading over HTTP
//! - The generic crawl pipeline
//! - The `Crawler` entry point that routes requests and publishes failures

mod loader;
mod pipeline;
mod request;
mod service;
mod stage;

pub use loader::{
    build_http_client, DownloadRequest, Downloaded, Downloader, HttpDownloader, HttpPageLoader,
    LoaderError, PageLoader,
};
pub use pipeline::{CrawlerStrategy, GenericCrawlerStrategy};
pub use request::{CrawlRequest, CrawlResponse, Document, LoadPageRequest, Request, UiAction};
pub use service::Crawler;
pub use stage::CrawlStage;
