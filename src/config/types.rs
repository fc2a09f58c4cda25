use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Site-Auditor
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "site")]
    pub sites: Vec<SiteEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Maximum number of page jobs running at once
    pub workers: u32,

    /// Connect timeout (seconds)
    pub connect_timeout: u64,

    /// Overall request timeout (seconds)
    pub timeout: u64,

    /// Maximum redirect hops the HTTP client follows
    pub max_redirects: u32,

    /// Wait before re-fetching a URL whose redirect carried a fragment (milliseconds)
    pub fragment_retry_delay: u64,

    /// How many fragment redirects are retried before the page is abandoned
    pub max_fragment_retries: u32,

    /// Skip TLS certificate verification
    pub accept_invalid_certs: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            connect_timeout: 60,
            timeout: 60,
            max_redirects: 10,
            fragment_retry_delay: 1000,
            max_fragment_retries: 1,
            accept_invalid_certs: false,
        }
    }
}

impl CrawlerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn fragment_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fragment_retry_delay)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A site to register and audit
#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    /// Root URL of the site (e.g., "https://example.com/")
    #[serde(rename = "base-url")]
    pub base_url: String,
}
