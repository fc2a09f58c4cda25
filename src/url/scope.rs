/// Strips a leading `http://` or `https://` from a URI
///
/// Site ownership ignores the scheme so a site keeps owning its own pages
/// after they move to https.
pub fn without_scheme(uri: &str) -> &str {
    uri.strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"))
        .unwrap_or(uri)
}

/// Checks whether a URI falls under a site's base URL
///
/// # Arguments
///
/// * `base_url` - The site's canonical base URL
/// * `uri` - The URI to test
///
/// # Returns
///
/// `true` if `uri` starts with `base_url` once both schemes are ignored.
/// Hosts compare case-insensitively; paths are case-sensitive.
///
/// # Examples
///
/// ```
/// use site_auditor::url::is_within_base;
///
/// assert!(is_within_base("http://example.com/", "https://example.com/about"));
/// assert!(!is_within_base("http://example.com/", "http://example.com.evil/"));
/// ```
pub fn is_within_base(base_url: &str, uri: &str) -> bool {
    let base = fold_host(without_scheme(base_url));
    let candidate = fold_host(without_scheme(uri));

    if base.is_empty() {
        return false;
    }

    // A base without a path still has to end at a host boundary
    if !base.contains('/') {
        return candidate == base
            || candidate.starts_with(&format!("{}/", base))
            || candidate.starts_with(&format!("{}?", base));
    }

    candidate.starts_with(&base)
}

/// Lowercases the authority of a scheme-less URI, leaving the rest untouched
fn fold_host(uri: &str) -> String {
    let end = uri
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(uri.len());
    let (authority, rest) = uri.split_at(end);
    format!("{}{}", authority.to_ascii_lowercase(), rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_scheme() {
        assert_eq!(without_scheme("https://a.com/x"), "a.com/x");
        assert_eq!(without_scheme("http://a.com/x"), "a.com/x");
        assert_eq!(without_scheme("a.com/x"), "a.com/x");
    }

    #[test]
    fn test_within_base_same_scheme() {
        assert!(is_within_base("http://example.com/", "http://example.com/"));
        assert!(is_within_base(
            "http://example.com/",
            "http://example.com/page?x=1"
        ));
    }

    #[test]
    fn test_within_base_ignores_scheme() {
        assert!(is_within_base("https://example.com/", "http://example.com/a"));
        assert!(is_within_base("http://example.com/", "https://example.com/a"));
    }

    #[test]
    fn test_within_base_subdirectory() {
        assert!(is_within_base(
            "http://example.com/docs/",
            "http://example.com/docs/intro"
        ));
        assert!(!is_within_base(
            "http://example.com/docs/",
            "http://example.com/blog/"
        ));
    }

    #[test]
    fn test_within_base_rejects_lookalike_hosts() {
        assert!(!is_within_base("http://example.com/", "http://example.com.evil/"));
        assert!(!is_within_base("http://example.com", "http://example.community/"));
        assert!(is_within_base("http://example.com", "http://example.com/a"));
    }

    #[test]
    fn test_within_base_case_insensitive_host() {
        assert!(is_within_base("http://example.com/", "http://EXAMPLE.com/a"));
    }

    #[test]
    fn test_within_base_path_is_case_sensitive() {
        assert!(is_within_base("http://x.com/Docs/", "http://X.com/Docs/intro"));
        assert!(!is_within_base("http://x.com/Docs/", "http://x.com/docs/intro"));
        assert!(!is_within_base("http://x.com/docs/", "https://x.com/DOCS/"));
    }
}
