//! HTML parser for extracting crawlable links
//!
//! This module turns a downloaded page into the set of in-scope URIs the crawl
//! scheduler should consider next.

use crate::url::{is_within_base, strip_fragment};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracts the links of a page that belong to the site being scanned
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` targets, resolved against the document's `<base href>`
///   if it has one, otherwise against `requested_uri_base`
///
/// **Exclude:**
/// - Empty and fragment-only references
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Anything that is not http(s) after resolution
/// - URIs outside `base_url` (the scheme is ignored)
/// - The page itself
///
/// Fragments are stripped from every result.
///
/// # Arguments
///
/// * `base_url` - The site's base URL
/// * `requested_uri_base` - The page URI up to and including the last `/` of its path
/// * `page_uri` - The page's own URI
/// * `html` - The HTML content
///
/// # Example
///
/// ```
/// use site_auditor::crawler::extract_crawlable_links;
///
/// let html = r#"<a href="b.html">B</a> <a href="https://other.org/">Other</a>"#;
/// let links = extract_crawlable_links(
///     "http://example.com/",
///     "http://example.com/docs/",
///     "http://example.com/docs/a.html",
///     html,
/// );
/// assert_eq!(links.into_iter().collect::<Vec<_>>(), vec!["http://example.com/docs/b.html"]);
/// ```
pub fn extract_crawlable_links(
    base_url: &str,
    requested_uri_base: &str,
    page_uri: &str,
    html: &str,
) -> BTreeSet<String> {
    let mut links = BTreeSet::new();

    let fallback = match Url::parse(requested_uri_base) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Cannot resolve links against {}: {}", requested_uri_base, e);
            return links;
        }
    };

    let document = Html::parse_document(html);
    let resolution_base = document_base(&document, &fallback).unwrap_or(fallback);
    let own_uri = strip_fragment(page_uri);

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };

            let Some(absolute) = resolve_link(href, &resolution_base) else {
                continue;
            };

            if absolute == own_uri || !is_within_base(base_url, &absolute) {
                continue;
            }

            links.insert(absolute);
        }
    }

    links
}

/// Reads `<base href>`, resolved against the page's own base
fn document_base(document: &Html, fallback: &Url) -> Option<Url> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document.select(&selector).next()?.value().attr("href")?;
    fallback.join(href.trim()).ok()
}

/// Resolves a link href to an absolute URL without fragment
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base: &Url) -> Option<String> {
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

    let mut absolute = base.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    absolute.set_fragment(None);
    Some(absolute.to_string())
}
