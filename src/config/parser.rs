use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_harvest::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Default continuation: {}", config.document.continuation);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let config: Config = toml::from_str(&content)?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so failure records can be traced back to the
/// configuration that produced them.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((Config, String))` - Successfully loaded configuration and its hash
/// * `Err(ConfigError)` - Failed to load or parse the configuration
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationKind;
    use crate::document::{PartKind, Selector};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use url::Url;

    const USER_AGENT: &str = r#"
[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = format!(
            r#"
[crawler]
min-throttle-secs = 2
max-throttle-secs = 5
{USER_AGENT}
[output]
database-path = "./test.db"

[document]
continuation = "domain-only"
download-content = true
[document.definition]
type = "auto-detect"

[[route]]
host = "*.example.org"
continuation = "custom"
[route.definition]
type = "article"
selector = "//article"
[route.definition.title]
type = "text"
selector = "h1"

[[route]]
uri = "https://example.org/raw"
provide-raw = true

[[continuation]]
host = "*.example.org"
allow = ["*.example.org", "partner.net"]
"#
        );

        let file = create_temp_config(&config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.min_throttle_secs, 2);
        assert_eq!(config.crawler.download_recursion_threshold, 2000);
        assert_eq!(config.user_agent.crawler_name, "TestCrawler");
        assert_eq!(config.document.continuation, ContinuationKind::DomainOnly);
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.continuations[0].allow.len(), 2);

        let routed = config.document_for(&Url::parse("https://news.example.org/a").unwrap());
        assert_eq!(routed.continuation, ContinuationKind::Custom);
        assert_eq!(routed.definition.kind(), PartKind::Article);
        assert_eq!(
            routed.definition.selector,
            Some(Selector::parse("//article").unwrap())
        );
        assert!(routed.download_content);

        let exact = config.document_for(&Url::parse("https://example.org/raw").unwrap());
        assert!(exact.provide_raw);
        assert_eq!(exact.definition.kind(), PartKind::AutoDetect);
        assert_eq!(exact.continuation, ContinuationKind::DomainOnly);

        let fallback = config.document_for(&Url::parse("https://other.net/").unwrap());
        assert_eq!(fallback, config.document);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = create_temp_config(USER_AGENT);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.min_throttle_secs, 3);
        assert_eq!(config.crawler.max_throttle_secs, 10);
        assert_eq!(config.crawler.request_timeout_secs, 30);
        assert_eq!(config.output.database_path, "./harvest.db");
        assert_eq!(config.document.definition.kind(), PartKind::AutoDetect);
        assert_eq!(config.document.continuation, ContinuationKind::None);

        let request = config.crawl_request(&Url::parse("https://example.com/").unwrap());
        assert_eq!(request.target().unwrap().as_str(), "https://example.com/");
        assert_eq!(request.continuation, ContinuationKind::None);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let config_content = format!(
            r#"{USER_AGENT}
[document.definition]
type = "text"
selector = "//div[position()>2]"
"#
        );
        let file = create_temp_config(&config_content);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = format!(
            r#"
[crawler]
min-throttle-secs = 20
max-throttle-secs = 10
{USER_AGENT}"#
        );

        let file = create_temp_config(&config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_custom_without_mapping_rejected() {
        let config_content = format!(
            r#"{USER_AGENT}
[document]
continuation = "custom"
"#
        );

        let file = create_temp_config(&config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_route_needs_exactly_one_target() {
        let config_content = format!(
            r#"{USER_AGENT}
[[route]]
uri = "https://example.com/"
host = "example.com"
"#
        );

        let file = create_temp_config(&config_content);
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let config_content = "test content";
        let file = create_temp_config(config_content);

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        // Same content should produce same hash
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
