//! Link resolution against a document base URI
//!
//! Every Link leaving the extraction engine carries an absolute URI, so this
//! is the single place where `href`/`src` values are turned into one.

use url::Url;

/// Resolves a link href against a base URI and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links (same page anchors)
/// - invalid URLs
/// - non-HTTP(S) URLs after resolution
///
/// Resolving an already-absolute HTTP(S) URI returns it unchanged.
pub fn resolve_link_url(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url)
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// String form of [`resolve_link_url`]
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    resolve_link_url(href, base_url).map(String::from)
}
