use url::Url;

/// The lowercase host of a URL, if it has one
///
/// Throttles, routes and continuation records are all keyed by this form.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_harvest::url::extract_domain;
///
/// let url = Url::parse("https://News.EXAMPLE.com:8443/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("news.example.com".to_string()));
///
/// let data = Url::parse("data:text/plain,hello").unwrap();
/// assert_eq!(extract_domain(&data), None);
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_host_keeps_no_port() {
        let url = Url::parse("http://127.0.0.1:8080/page").unwrap();
        assert_eq!(extract_domain(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_host_is_lowercased() {
        let url = Url::parse("https://Blog.Example.COM/post?q=Upper").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }
}
