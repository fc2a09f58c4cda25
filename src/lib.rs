//! Site-Auditor: crawl scheduling and download reconciliation for website audits
//!
//! This crate decides which URLs belong to a scan of a site, downloads them under
//! strict content-type and scope rules, reconciles redirects (fragments, https
//! upgrades, off-site hops, duplicates) and expands the crawl frontier with the
//! in-scope links found on every downloaded page.

pub mod config;
pub mod crawler;
pub mod output;
pub mod scan;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Auditor operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Error downloading {uri}: {source}")]
    Network {
        uri: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Download abandoned: {0}")]
    Download(#[from] DownloadError),

    #[error("Persistence error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl AuditError {
    /// Returns true for outcomes that only mean "stop working on this page"
    ///
    /// Policy decisions of the downloader are expected control flow and
    /// should not be reported as failures.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Download(_))
    }

    /// Returns true when the scan this task belonged to was replaced or deleted
    pub fn is_superseded(&self) -> bool {
        matches!(
            self,
            Self::Download(DownloadError::BaseUrlUpgraded { .. })
                | Self::Download(DownloadError::ScanDeleted { .. })
        )
    }
}

/// Reasons the downloader abandons a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("effective URI {effective} does not belong to current site")]
    OffSite { effective: String },

    #[error("base URL upgraded to https: {base_url}")]
    BaseUrlUpgraded { base_url: String },

    #[error("effective URI {effective} was already found")]
    AlreadyFound { effective: String },

    #[error("fragment redirects kept going after {attempts} retries at {uri}")]
    FragmentLoop { uri: String, attempts: u32 },

    #[error("scan {scan_id} was deleted while its page was being downloaded")]
    ScanDeleted { scan_id: i64 },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Site-Auditor operations
pub type Result<T> = std::result::Result<T, AuditError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{Priority, ScanStatus, ScanType};
pub use crate::url::{canonical_base_url, strip_fragment, uri_hash};
