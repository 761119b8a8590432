//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive the real
//! HTTP collaborators and SQLite storage through complete crawls.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use sumi_harvest::config::{
    load_config, Config, CrawlerConfig, DocumentConfig, OutputConfig, UserAgentConfig,
};
use sumi_harvest::continuation::ContinuationKind;
use sumi_harvest::crawler::{
    build_http_client, CrawlStage, Crawler, GenericCrawlerStrategy, HttpDownloader,
    HttpPageLoader, Request,
};
use sumi_harvest::document::{Article, DocumentPart, File, PartKind, Selector, Text};
use sumi_harvest::mapper::StrategyMapper;
use sumi_harvest::metrics::AnomalyCounter;
use sumi_harvest::storage::SqliteStorage;
use sumi_harvest::throttle::{InMemorySharedCache, RequestManagerFactory};
use sumi_harvest::CrawlErrorKind;
use tempfile::{NamedTempFile, TempDir};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no pacing delay
fn create_test_config(db_path: &str, document: DocumentConfig) -> Config {
    Config {
        crawler: CrawlerConfig {
            min_throttle_secs: 0,
            max_throttle_secs: 0,
            download_recursion_threshold: 10,
            request_timeout_secs: 5,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        document,
        routes: vec![],
        continuations: vec![],
    }
}

struct Harness {
    crawler: Crawler,
    storage: Arc<SqliteStorage>,
    metrics: Arc<AnomalyCounter>,
}

/// Wires the HTTP collaborators and SQLite storage the way the binary does
fn harness(config: &Config) -> Harness {
    let client =
        build_http_client(&config.user_agent, config.crawler.request_timeout()).unwrap();
    let storage = Arc::new(SqliteStorage::new(Path::new(&config.output.database_path)).unwrap());
    let metrics = Arc::new(AnomalyCounter::new());
    let throttles = Arc::new(RequestManagerFactory::new(
        config.crawler.throttle_settings(),
        Arc::new(InMemorySharedCache::new()),
    ));

    let strategy = Arc::new(GenericCrawlerStrategy::new(
        Arc::new(HttpPageLoader::new(client.clone())),
        Arc::new(HttpDownloader::new(client)),
        throttles,
        metrics.clone(),
    ));
    let mapper = StrategyMapper::from_config(config, strategy, storage.clone());

    Harness {
        crawler: Crawler::new(mapper, storage.clone()),
        storage,
        metrics,
    }
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("harvest.db").to_string_lossy().to_string()
}

async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn page_url(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_title_text_over_http() {
    let mock_server = MockServer::start().await;
    mount_page(
        &mock_server,
        "/",
        "<html><h1>Title Text</h1></html>".to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let document = DocumentConfig {
        definition: DocumentPart::text(Selector::parse("//h1").unwrap()),
        ..DocumentConfig::default()
    };
    let config = create_test_config(&db_path(&dir), document);
    let harness = harness(&config);

    let request = config.crawl_request(&page_url(&mock_server, "/"));
    let response = harness
        .crawler
        .crawl(Request::new(request.clone()), &CancellationToken::new())
        .await
        .expect("crawl should succeed");

    let root = response.root().unwrap();
    assert_eq!(root.get::<Text>().unwrap().text, "Title Text");
    assert!(response.anomalies.is_empty());
    assert_eq!(response.crawler_id, request.id);
    assert_eq!(harness.metrics.total(), 0);
    assert_eq!(harness.storage.count_scheduled_links().unwrap(), 0);
}

#[tokio::test]
async fn test_auto_detect_with_domain_only_continuation() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        format!(
            r#"<html><head><title>Home</title></head><body>
            <nav><a href="/about">About</a> <a href="https://other.org/x">Elsewhere</a></nav>
            <div id="story">
                <h1>Harvest notes</h1>
                <p>The first paragraph carries most of the words on this page, enough to
                stand out from the navigation and the footer.</p>
                <p>A second paragraph adds a little more text to the same block.</p>
            </div>
            <footer><a href="{}/files/report.pdf">Report</a></footer>
            </body></html>"#,
            base_url
        ),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let document = DocumentConfig {
        continuation: ContinuationKind::DomainOnly,
        ..DocumentConfig::default()
    };
    let config = create_test_config(&db_path(&dir), document);
    let harness = harness(&config);
    let target = page_url(&mock_server, "/");

    let response = harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&target)),
            &CancellationToken::new(),
        )
        .await
        .expect("crawl should succeed");

    let root = response.root().unwrap();
    assert_eq!(root.kind(), PartKind::AutoDetect);
    assert_eq!(root.all::<Article>().len(), 1);
    assert_eq!(root.links(true).len(), 3);
    assert_eq!(root.all::<File>().len(), 1);

    let scheduled: Vec<String> = harness
        .storage
        .scheduled_links()
        .unwrap()
        .into_iter()
        .map(|record| record.uri)
        .collect();
    assert_eq!(
        scheduled,
        vec![
            format!("{}/about", base_url),
            format!("{}/files/report.pdf", base_url),
        ]
    );

    // A re-crawl finds the same links and schedules nothing new
    harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&target)),
            &CancellationToken::new(),
        )
        .await
        .expect("re-crawl should succeed");
    assert_eq!(harness.storage.count_scheduled_links().unwrap(), 2);
}

#[tokio::test]
async fn test_download_content() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/docs",
        r#"<html><body><ul>
            <li><a class="doc" href="/a.pdf">A</a></li>
            <li><a class="doc" href="/gone.pdf">Gone</a></li>
        </ul></body></html>"#
            .to_string(),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/a.pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"%PDF-1.4 test".to_vec())
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let document = DocumentConfig {
        download_content: true,
        definition: DocumentPart::file(Selector::parse("a.doc").unwrap()),
        ..DocumentConfig::default()
    };
    let config = create_test_config(&db_path(&dir), document);
    let harness = harness(&config);

    let response = harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&page_url(&mock_server, "/docs"))),
            &CancellationToken::new(),
        )
        .await
        .expect("a failed download must not fail the crawl");

    let file = response.root().unwrap().get::<File>().unwrap();
    assert_eq!(file.download_links.len(), 2);
    assert_eq!(file.file_data_list.len(), 2);

    let data = file.file_data_list[0].as_ref().unwrap();
    assert_eq!(data.bytes, b"%PDF-1.4 test".to_vec());
    assert_eq!(data.content_type.as_deref(), Some("application/pdf"));
    assert!(file.file_data_list[1].is_none());
}

#[tokio::test]
async fn test_failed_page_load_is_recorded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&db_path(&dir), DocumentConfig::default());
    let harness = harness(&config);

    let target = page_url(&mock_server, "/broken");
    let request = config.crawl_request(&target);
    let err = harness
        .crawler
        .crawl(Request::new(request.clone()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, CrawlStage::PageLoaded);
    assert!(matches!(err.kind, CrawlErrorKind::PageLoad(_)));
    assert_eq!(err.host.as_deref(), Some("127.0.0.1"));

    let failures = harness.storage.failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].crawler_id, Some(request.id));
    assert_eq!(failures[0].kind, "page_load");
    assert_eq!(failures[0].stage, CrawlStage::PageLoaded);
    assert_eq!(failures[0].uri.as_deref(), Some(target.as_str()));
    assert!(failures[0].message.contains("500"));
}

#[tokio::test]
async fn test_config_file_routes_and_custom_continuation() {
    let mock_server = MockServer::start().await;

    mount_page(
        &mock_server,
        "/news",
        r#"<html><body>
            <article><h2>Morning edition</h2><p>Body text.</p></article>
            <a href="/news/1">One</a>
            <a href="https://partner.example.net/2">Two</a>
            <a href="https://unrelated.org/3">Three</a>
        </body></html>"#
            .to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config_content = format!(
        r#"
[crawler]
min-throttle-secs = 0
max-throttle-secs = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{}"

[document]
continuation = "custom"

[[route]]
host = "127.0.0.1"
[route.definition]
type = "text"
selector = "//article/h2"

[[continuation]]
host = "127.0.0.1"
allow = ["127.0.0.1", "*.example.net"]
"#,
        db_path(&dir).replace('\\', "/")
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(config_content.as_bytes()).unwrap();
    file.flush().unwrap();

    let config = load_config(file.path()).unwrap();
    let harness = harness(&config);

    let response = harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&page_url(&mock_server, "/news"))),
            &CancellationToken::new(),
        )
        .await
        .expect("crawl should succeed");

    assert_eq!(
        response.root().unwrap().get::<Text>().unwrap().text,
        "Morning edition"
    );
    // A text root holds no links, so nothing is scheduled
    assert_eq!(harness.storage.count_scheduled_links().unwrap(), 0);
}

#[tokio::test]
async fn test_custom_continuation_filters_hosts() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_page(
        &mock_server,
        "/",
        r#"<html><body>
            <p>Links worth following and some that are not.</p>
            <a href="/local">Local</a>
            <a href="https://partner.example.net/2">Partner</a>
            <a href="https://unrelated.org/3">Unrelated</a>
        </body></html>"#
            .to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        &db_path(&dir),
        DocumentConfig {
            continuation: ContinuationKind::Custom,
            ..DocumentConfig::default()
        },
    );
    config.continuations = vec![sumi_harvest::config::ContinuationConfig {
        uri: None,
        host: Some("127.0.0.1".to_string()),
        allow: vec!["127.0.0.1".to_string(), "*.example.net".to_string()],
    }];
    let harness = harness(&config);

    harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&page_url(&mock_server, "/"))),
            &CancellationToken::new(),
        )
        .await
        .expect("crawl should succeed");

    let scheduled: Vec<String> = harness
        .storage
        .scheduled_links()
        .unwrap()
        .into_iter()
        .map(|record| record.uri)
        .collect();
    assert_eq!(
        scheduled,
        vec![
            format!("{}/local", base_url),
            "https://partner.example.net/2".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_cancelled_crawl_is_recorded() {
    let mock_server = MockServer::start().await;
    mount_page(&mock_server, "/", "<h1>never read</h1>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&db_path(&dir), DocumentConfig::default());
    let harness = harness(&config);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness
        .crawler
        .crawl(
            Request::new(config.crawl_request(&page_url(&mock_server, "/"))),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(harness.storage.failures().unwrap()[0].kind, "cancelled");
}
