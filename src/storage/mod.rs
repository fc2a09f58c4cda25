//! Storage module for persisting audit data
//!
//! This module handles all database operations for the crawl engine, including:
//! - SQLite database initialization and schema management
//! - Site registry records and base URL updates
//! - Scan lifecycle persistence and cascading deletion
//! - Create-if-absent page records keyed by `(scan, uri_hash)`
//! - The priority job table drained by the worker pool

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::{ScanStatus, ScanType};
use crate::AuditError;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage handle shared between worker tasks
pub type SharedStorage<S = SqliteStorage> = Arc<Mutex<S>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(AuditError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, AuditError> {
    SqliteStorage::new(path)
}

/// Locks a shared storage handle
///
/// A poisoned lock means a task panicked mid-write; it is reported as a
/// database error instead of propagating the panic.
pub fn lock<S>(storage: &Mutex<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}

/// A registered site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub id: i64,
    pub base_url: String,
}

/// One crawl run against a site
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub id: i64,
    pub sites_id: i64,
    pub gpa: f64,
    pub status: ScanStatus,
    pub scan_type: ScanType,
    pub start_time: String,
    pub end_time: Option<String>,
    pub error: Option<String>,
}

/// Optional fields supplied when creating a scan
#[derive(Debug, Clone, Default)]
pub struct ScanDetails {
    pub scan_type: ScanType,
}

/// One URL's unit of work within a scan
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub scans_id: i64,
    pub sites_id: i64,
    pub uri: String,
    pub uri_hash: String,
}

/// A queued unit of asynchronous work
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub job_type: JobType,
    pub pages_id: i64,
    pub priority: u32,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub finished_at: Option<String>,
}

/// Result of a create-if-absent insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    /// The row was created
    Created(T),
    /// A row with the same identity already exists; nothing was written
    AlreadyExists,
    /// The owning scan no longer exists; nothing was written
    ScanGone,
}

impl<T> InsertOutcome<T> {
    /// Returns the created value, if any
    pub fn created(self) -> Option<T> {
        match self {
            Self::Created(value) => Some(value),
            _ => None,
        }
    }
}

/// Kinds of job the queue knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// Download a page, then expand the frontier from its links
    PageScan,
}

impl JobType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::PageScan => "page_scan",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "page_scan" => Some(Self::PageScan),
            _ => None,
        }
    }
}

/// Status of a queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    /// The job's scan was replaced or deleted; never retried
    Superseded,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    /// Returns true once the job will not run again
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}
