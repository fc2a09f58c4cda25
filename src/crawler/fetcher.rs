//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with timeouts, redirect limits and the user agent string
//! - The content-type gate applied to response headers before the body is read
//! - Mapping transport failures to network errors carrying the requested URI

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::AuditError;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};

/// Media types whose bodies are downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptedMediaType {
    TextHtml,
    ApplicationXhtml,
}

impl AcceptedMediaType {
    pub const ALL: [AcceptedMediaType; 2] = [Self::TextHtml, Self::ApplicationXhtml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextHtml => "text/html",
            Self::ApplicationXhtml => "application/xhtml+xml",
        }
    }

    /// Matches a `Content-Type` value against the allow-list
    ///
    /// Parameters such as `charset` are ignored and the comparison is
    /// case-insensitive.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let media_type = value.split(';').next().unwrap_or("").trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|accepted| accepted.as_str() == media_type)
    }
}

/// Verdict of the content-type gate for one header line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Not a `key: value` pair, or not the content type
    Ignore,
    /// An accepted content type
    Accept,
    /// Any other content type; the transfer must stop
    Reject { content_type: String },
}

/// Checks one raw response header line
///
/// A line is only considered when splitting it on `:` gives exactly a key and
/// a value.
///
/// # Examples
///
/// ```
/// use site_auditor::crawler::{check_header_line, HeaderCheck};
///
/// assert_eq!(check_header_line("Content-Type: text/html; charset=utf-8"), HeaderCheck::Accept);
/// assert_eq!(check_header_line("HTTP/1.1 200 OK"), HeaderCheck::Ignore);
/// ```
pub fn check_header_line(line: &str) -> HeaderCheck {
    let parts: Vec<&str> = line.split(':').collect();
    if parts.len() != 2 {
        return HeaderCheck::Ignore;
    }

    if !parts[0].trim().eq_ignore_ascii_case("content-type") {
        return HeaderCheck::Ignore;
    }

    let value = parts[1].trim();
    match AcceptedMediaType::from_content_type(value) {
        Some(_) => HeaderCheck::Accept,
        None => HeaderCheck::Reject {
            content_type: value.to_string(),
        },
    }
}

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// The body was downloaded
    Html {
        /// Final URL after redirects
        effective_url: String,
        /// Page body content
        body: String,
    },

    /// The content type is not HTML; the body was never read
    Rejected {
        /// The Content-Type value received
        content_type: String,
    },
}

/// Something that can fetch a page
///
/// The downloader only talks to the network through this trait.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `uri`, following redirects
    ///
    /// Transport failures are reported as `AuditError::Network`.
    async fn fetch(&self, uri: &str) -> crate::Result<FetchResult>;
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, uri: &str) -> crate::Result<FetchResult> {
        (**self).fetch(uri).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `crawler` - Timeouts, redirect limit and TLS settings
/// * `user_agent` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(crawler.timeout())
        .connect_timeout(crawler.connect_timeout())
        .redirect(Policy::limited(crawler.max_redirects as usize))
        .referer(true)
        .danger_accept_invalid_certs(crawler.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP with the content-type gate
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the fetcher and its client from configuration
    pub fn from_config(
        crawler: &CrawlerConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, AuditError> {
        Ok(Self::new(build_http_client(crawler, user_agent)?))
    }
}

fn network_error(uri: &str, err: reqwest::Error) -> AuditError {
    AuditError::Network {
        uri: uri.to_string(),
        source: Box::new(err),
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str) -> crate::Result<FetchResult> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| network_error(uri, e))?;

        // Headers are in, the body is not: decide before reading it
        for (name, value) in response.headers() {
            let line = format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
            if let HeaderCheck::Reject { content_type } = check_header_line(&line) {
                tracing::debug!("Skipping {} ({})", uri, content_type);
                return Ok(FetchResult::Rejected { content_type });
            }
        }

        let effective_url = response.url().to_string();
        let body = response.text().await.map_err(|e| network_error(uri, e))?;

        Ok(FetchResult::Html {
            effective_url,
            body,
        })
    }
}
