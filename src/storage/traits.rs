//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{ScanStatus, ScanType};
use crate::storage::{
    InsertOutcome, JobRecord, JobStatus, JobType, PageRecord, ScanDetails, ScanRecord, SiteRecord,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Site not found: {0}")]
    SiteNotFound(i64),

    #[error("Scan not found: {0}")]
    ScanNotFound(i64),

    #[error("Page not found: {0}")]
    PageNotFound(i64),

    #[error("Invalid scan transition: {from:?} -> {to:?}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every persistence operation the crawl engine needs.
/// Writers take `&mut self`; callers sharing a backend between tasks wrap it
/// in a mutex, which also makes each call atomic with respect to the others.
pub trait Storage {
    // ===== Site Registry =====

    /// Registers a site, or returns the existing one with the same base URL
    ///
    /// The base URL is stored as given; callers canonicalize it first.
    fn insert_site(&mut self, base_url: &str) -> StorageResult<SiteRecord>;

    /// Gets a site by ID
    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>>;

    /// Lists every registered site
    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>>;

    /// Resolves the site that owns a URL
    ///
    /// The owner is the site with the longest base URL that prefixes `url`,
    /// ignoring the http/https scheme.
    fn closest_site_for_url(&self, url: &str) -> StorageResult<Option<SiteRecord>>;

    /// Replaces a site's base URL
    fn update_site_base_url(&mut self, site_id: i64, base_url: &str) -> StorageResult<()>;

    // ===== Scan Management =====

    /// Inserts a new scan in the CREATED state
    fn insert_scan(&mut self, sites_id: i64, details: &ScanDetails) -> StorageResult<ScanRecord>;

    /// Gets a scan by ID
    fn get_scan(&self, scan_id: i64) -> StorageResult<Option<ScanRecord>>;

    /// Lists scans, newest first
    fn list_scans(&self) -> StorageResult<Vec<ScanRecord>>;

    /// Lists the scans of a site that have not reached a terminal state
    fn get_active_scans_for_site(&self, sites_id: i64) -> StorageResult<Vec<ScanRecord>>;

    /// Moves a scan forward in its lifecycle
    ///
    /// Fails with `InvalidTransition` unless the move is forward. Terminal
    /// states also set `end_time`; `error` is only written for ERROR.
    fn update_scan_status(
        &mut self,
        scan_id: i64,
        status: ScanStatus,
        error: Option<&str>,
    ) -> StorageResult<()>;

    /// Deletes a scan together with its pages and their jobs, atomically
    ///
    /// Returns false if the scan did not exist.
    fn delete_scan(&mut self, scan_id: i64) -> StorageResult<bool>;

    /// Counts scans in the given state
    fn count_scans_by_status(&self, status: ScanStatus) -> StorageResult<u64>;

    // ===== Page Management =====

    /// Creates a page unless one already exists for `(scans_id, uri)`
    fn insert_page_if_absent(
        &mut self,
        scans_id: i64,
        sites_id: i64,
        uri: &str,
    ) -> StorageResult<InsertOutcome<PageRecord>>;

    /// Creates a page and its download job in one transaction
    ///
    /// A crash can therefore never leave a page without a job.
    fn insert_page_with_job(
        &mut self,
        scans_id: i64,
        sites_id: i64,
        uri: &str,
        priority: u32,
    ) -> StorageResult<InsertOutcome<(PageRecord, i64)>>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>>;

    /// Looks a page up by its scan and exact URI
    fn get_page_by_scan_and_uri(
        &self,
        scans_id: i64,
        uri: &str,
    ) -> StorageResult<Option<PageRecord>>;

    /// Rewrites a page's URI and digest
    ///
    /// Returns false, writing nothing, if another page of the same scan
    /// already holds that URI.
    fn update_page_uri(&mut self, page_id: i64, uri: &str) -> StorageResult<bool>;

    /// Counts the pages of a scan
    fn count_pages_for_scan(&self, scans_id: i64) -> StorageResult<u64>;

    /// Gets total page count
    fn count_total_pages(&self) -> StorageResult<u64>;

    // ===== Job Queue =====

    /// Adds a pending job
    fn enqueue_job(&mut self, job_type: JobType, pages_id: i64, priority: u32)
        -> StorageResult<i64>;

    /// Claims the highest priority pending job (oldest first within a priority)
    ///
    /// The job is marked running and its attempt counter incremented.
    fn claim_next_job(&mut self) -> StorageResult<Option<JobRecord>>;

    /// Records the outcome of a job
    fn finish_job(&mut self, job_id: i64, status: JobStatus, error: Option<&str>)
        -> StorageResult<()>;

    /// Puts jobs left running by a crashed process back in the queue
    ///
    /// Returns the number of jobs requeued.
    fn requeue_interrupted_jobs(&mut self) -> StorageResult<u64>;

    /// Gets all jobs of a page, oldest first
    fn get_jobs_for_page(&self, pages_id: i64) -> StorageResult<Vec<JobRecord>>;

    /// Gets the job of a scan's root page (its first page)
    fn get_root_job_for_scan(&self, scans_id: i64) -> StorageResult<Option<JobRecord>>;

    /// Counts pending and running jobs belonging to a scan
    fn count_open_jobs_for_scan(&self, scans_id: i64) -> StorageResult<u64>;

    /// Counts jobs in the given state
    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64>;

    /// Gets the scan type of a scan, if the scan exists
    fn get_scan_type(&self, scan_id: i64) -> StorageResult<Option<ScanType>> {
        Ok(self.get_scan(scan_id)?.map(|scan| scan.scan_type))
    }
}
