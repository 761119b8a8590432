/// Whether `candidate` is a host selected by a route or allow-list pattern
///
/// A plain pattern selects exactly that host. A `*.` pattern selects its
/// base domain and every subdomain below it, however deep. Comparison
/// ignores ASCII case.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "Example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    match pattern.strip_prefix("*.") {
        Some(base) => candidate
            .strip_suffix(base)
            .is_some_and(|rest| rest.is_empty() || rest.ends_with('.')),
        None => candidate == pattern,
    }
}
