//! URL handling module for Site-Auditor
//!
//! This module provides base URL canonicalization, fragment handling, the
//! fixed-width URI digest used as the page lookup key, and the site scope rule
//! shared by the registry and the link extractor.

mod hash;
mod scope;

use crate::UrlError;
use url::Url;

// Re-export main functions
pub use hash::uri_hash;
pub use scope::{is_within_base, without_scheme};

/// Canonicalizes a site base URL
///
/// The URL is parsed and re-serialized by the `url` crate so that stored base
/// URLs compare equal to the effective URLs reported by the HTTP client
/// (`http://Example.com` becomes `http://example.com/`). Fragments are dropped.
///
/// # Examples
///
/// ```
/// use site_auditor::url::canonical_base_url;
///
/// let base = canonical_base_url("http://Example.com").unwrap();
/// assert_eq!(base, "http://example.com/");
/// ```
pub fn canonical_base_url(raw: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url.to_string())
}

/// Returns true if the URI carries a fragment (anything after a `#`)
pub fn has_fragment(uri: &str) -> bool {
    uri.contains('#')
}

/// Removes everything from the first `#` on
///
/// # Examples
///
/// ```
/// use site_auditor::url::strip_fragment;
///
/// assert_eq!(strip_fragment("http://site/a#other"), "http://site/a");
/// assert_eq!(strip_fragment("http://site/a"), "http://site/a");
/// ```
pub fn strip_fragment(uri: &str) -> &str {
    match uri.split_once('#') {
        Some((before, _)) => before,
        None => uri,
    }
}

/// Returns true for `https://` URIs
pub fn is_https(uri: &str) -> bool {
    uri.starts_with("https://")
}

/// Rewrites an `https://` URI to its `http://` counterpart
///
/// Any other URI is returned unchanged.
pub fn downgrade_to_http(uri: &str) -> String {
    match uri.strip_prefix("https://") {
        Some(rest) => format!("http://{}", rest),
        None => uri.to_string(),
    }
}

/// Returns the directory part of a URI: everything up to and including the last `/`
/// of its path, without query or fragment
///
/// Relative links on a page resolve against this base.
pub fn uri_base(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.set_query(None);
            let path = url.path().to_string();
            let dir = match path.rfind('/') {
                Some(idx) => &path[..=idx],
                None => "/",
            };
            url.set_path(dir);
            url.to_string()
        }
        Err(_) => uri.to_string(),
    }
}
