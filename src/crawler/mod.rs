//! Crawler module for downloading and expanding scans
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind the content-type gate
//! - Redirect reconciliation of downloaded pages
//! - Link extraction and frontier expansion
//! - The worker pool that drains the job queue

mod coordinator;
mod downloader;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{finish_scan_if_idle, job_outcome, PageProgress, PoolSummary, WorkerPool};
pub use downloader::{reconcile, Downloader, Reconciliation, RedirectFacts, RetryPolicy};
pub use fetcher::{
    build_http_client, check_header_line, AcceptedMediaType, FetchResult, HeaderCheck,
    HttpFetcher, PageFetcher,
};
pub use parser::extract_crawlable_links;
pub use scheduler::expand_frontier;

use crate::config::Config;
use crate::storage::{SharedStorage, SqliteStorage};

/// Drains the job queue using the HTTP fetcher described by `config`
///
/// # Arguments
///
/// * `config` - The auditor configuration
/// * `storage` - The shared storage handle
///
/// # Returns
///
/// * `Ok(PoolSummary)` - Every queued job has run
/// * `Err(AuditError)` - The HTTP client could not be built or storage failed
pub async fn run_queue(
    config: &Config,
    storage: SharedStorage<SqliteStorage>,
) -> crate::Result<PoolSummary> {
    let fetcher = HttpFetcher::from_config(&config.crawler, &config.user_agent)?;
    let policy = RetryPolicy::from_config(&config.crawler);
    let pool = WorkerPool::new(storage, fetcher, policy, config.crawler.workers as usize);
    pool.run_until_idle().await
}
