//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest content crawler.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{
    build_http_client, Crawler, GenericCrawlerStrategy, HttpDownloader, HttpPageLoader, Request,
};
use sumi_harvest::mapper::StrategyMapper;
use sumi_harvest::metrics::TracingMetrics;
use sumi_harvest::storage::open_storage;
use sumi_harvest::throttle::{InMemorySharedCache, RequestManagerFactory};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Sumi-Harvest: A polite structured-content crawler
///
/// Sumi-Harvest loads a page, extracts the document parts described by the
/// configuration, optionally downloads linked files and schedules the links
/// it discovers for later crawls, pacing every request per host.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite structured-content crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// The page to crawl
    #[arg(value_name = "URI")]
    uri: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show how the URI would be crawled without crawling it
    #[arg(long)]
    dry_run: bool,

    /// Download every file the extraction finds
    #[arg(long)]
    download: bool,

    /// Include the raw page source in the response
    #[arg(long)]
    raw: bool,
}

#[tokio::main]
async fn main() -> sumi_harvest::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let uri = Url::parse(cli.uri.trim())?;

    if cli.dry_run {
        handle_dry_run(&config, &uri);
    } else {
        handle_crawl(config, uri, cli.download, cli.raw).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows how the URI would be crawled
fn handle_dry_run(config: &Config, uri: &Url) {
    let template = config.document_for(uri);

    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Target: {}", uri);
    println!("  Host: {}", uri.host_str().unwrap_or("-"));

    println!("\nThrottle:");
    println!(
        "  Wait between requests: {}-{}s",
        config.crawler.min_throttle_secs, config.crawler.max_throttle_secs
    );
    println!(
        "  Download poll ceiling: {}",
        config.crawler.download_recursion_threshold
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);

    println!("\nUser Agent: {}", config.user_agent.user_agent_string());
    println!("Database: {}", config.output.database_path);

    println!("\nDocument:");
    println!("  Continuation: {}", template.continuation);
    println!("  Download content: {}", template.download_content);
    println!("  Provide raw: {}", template.provide_raw);
    println!("  Definition:");
    for part in template.definition.walk() {
        println!("    - {}", part.label());
    }

    println!(
        "\nRoutes: {}, custom continuations: {}",
        config.routes.len(),
        config.continuations.len()
    );
    println!("\n✓ Configuration is valid");
}

/// Handles the crawl: wires the HTTP collaborators, crawls once and prints
/// the response as JSON
async fn handle_crawl(
    config: Config,
    uri: Url,
    download: bool,
    raw: bool,
) -> sumi_harvest::Result<()> {
    let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;
    let storage = Arc::new(open_storage(Path::new(&config.output.database_path))?);
    let throttles = Arc::new(RequestManagerFactory::new(
        config.crawler.throttle_settings(),
        Arc::new(InMemorySharedCache::new()),
    ));

    let strategy = Arc::new(GenericCrawlerStrategy::new(
        Arc::new(HttpPageLoader::new(client.clone())),
        Arc::new(HttpDownloader::new(client)),
        throttles,
        Arc::new(TracingMetrics),
    ));
    let mapper = StrategyMapper::from_config(&config, strategy, storage.clone());
    let crawler = Crawler::new(mapper, storage.clone());

    let mut crawl_request = config.crawl_request(&uri);
    if download {
        crawl_request = crawl_request.with_download_content(true);
    }
    if raw {
        crawl_request = crawl_request.with_provide_raw(true);
    }

    // Ctrl-C cancels the crawl; the failure is still recorded
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling crawl");
            on_signal.cancel();
        }
    });

    tracing::info!("Crawling {}", uri);
    match crawler.crawl(Request::new(crawl_request), &cancel).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            tracing::info!(
                "Crawl completed, {} link(s) scheduled in total",
                storage.count_scheduled_links()?
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
