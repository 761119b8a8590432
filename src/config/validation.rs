use crate::config::types::{
    Config, ContinuationConfig, CrawlerConfig, OutputConfig, RouteConfig, UserAgentConfig,
};
use crate::continuation::ContinuationKind;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Selectors are compiled while the TOML is deserialized, so a bad
/// selector never reaches this point.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_routes(&config.routes)?;
    validate_continuations(&config.continuations)?;
    validate_custom_is_mapped(config)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.min_throttle_secs > config.max_throttle_secs {
        return Err(ConfigError::Validation(format!(
            "min-throttle-secs ({}) must not exceed max-throttle-secs ({})",
            config.min_throttle_secs, config.max_throttle_secs
        )));
    }

    if config.download_recursion_threshold < 1 {
        return Err(ConfigError::Validation(
            "download-recursion-threshold must be >= 1".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    if config.crawler_version.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-version cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates `[[route]]` entries
fn validate_routes(routes: &[RouteConfig]) -> Result<(), ConfigError> {
    for (index, route) in routes.iter().enumerate() {
        validate_target("route", index, &route.uri, &route.host)?;
    }
    Ok(())
}

/// Validates `[[continuation]]` entries
fn validate_continuations(entries: &[ContinuationConfig]) -> Result<(), ConfigError> {
    for (index, entry) in entries.iter().enumerate() {
        validate_target("continuation", index, &entry.uri, &entry.host)?;

        if entry.allow.is_empty() {
            return Err(ConfigError::Validation(format!(
                "continuation #{} must allow at least one host pattern",
                index + 1
            )));
        }
        for pattern in &entry.allow {
            validate_domain_pattern(pattern)?;
        }
    }
    Ok(())
}

/// A `custom` continuation needs somewhere to route to
fn validate_custom_is_mapped(config: &Config) -> Result<(), ConfigError> {
    let wants_custom = config.document.continuation == ContinuationKind::Custom
        || config
            .routes
            .iter()
            .any(|route| route.continuation == Some(ContinuationKind::Custom));

    if wants_custom && config.continuations.is_empty() {
        return Err(ConfigError::Validation(
            "custom continuation selected but no [[continuation]] entries are configured"
                .to_string(),
        ));
    }
    Ok(())
}

/// Exactly one of `uri` / `host`, each well formed
fn validate_target(
    table: &str,
    index: usize,
    uri: &Option<String>,
    host: &Option<String>,
) -> Result<(), ConfigError> {
    match (uri, host) {
        (Some(uri), None) => {
            Url::parse(uri).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid {} uri '{}': {}", table, uri, e))
            })?;
            Ok(())
        }
        (None, Some(host)) => validate_domain_pattern(host),
        _ => Err(ConfigError::Validation(format!(
            "{} #{} must set exactly one of 'uri' or 'host'",
            table,
            index + 1
        ))),
    }
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Single-label hosts such as localhost are allowed
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
