//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{ScanStatus, ScanType};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    InsertOutcome, JobRecord, JobStatus, JobType, PageRecord, ScanDetails, ScanRecord, SiteRecord,
};
use crate::url::{is_within_base, uri_hash};
use crate::AuditError;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

/// Longest error message kept on a scan
const MAX_SCAN_ERROR_LEN: usize = 256;

const SCAN_COLUMNS: &str =
    "id, sites_id, gpa, status, scan_type, start_time, end_time, error";

const JOB_COLUMNS: &str =
    "id, job_type, pages_id, priority, status, attempts, error, created_at, finished_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(AuditError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self { conn })
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        base_url: row.get(1)?,
    })
}

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get(0)?,
        sites_id: row.get(1)?,
        gpa: row.get(2)?,
        status: ScanStatus::from_db_string(&row.get::<_, String>(3)?).unwrap_or(ScanStatus::Error),
        scan_type: ScanType::from_db_string(&row.get::<_, String>(4)?).unwrap_or_default(),
        start_time: row.get(5)?,
        end_time: row.get(6)?,
        error: row.get(7)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRecord> {
    Ok(PageRecord {
        id: row.get(0)?,
        scans_id: row.get(1)?,
        sites_id: row.get(2)?,
        uri: row.get(3)?,
        uri_hash: row.get(4)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        job_type: JobType::from_db_string(&row.get::<_, String>(1)?).unwrap_or(JobType::PageScan),
        pages_id: row.get(2)?,
        priority: row.get(3)?,
        status: JobStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(JobStatus::Failed),
        attempts: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Inserts a page row unless the scan is gone or the URI is already present
///
/// Shared by the plain insert and the page-plus-job transaction.
fn insert_page_row(
    conn: &Connection,
    scans_id: i64,
    sites_id: i64,
    uri: &str,
) -> StorageResult<InsertOutcome<PageRecord>> {
    let scan_exists: bool = conn
        .query_row("SELECT 1 FROM scans WHERE id = ?1", params![scans_id], |_| Ok(true))
        .optional()?
        .unwrap_or(false);

    if !scan_exists {
        return Ok(InsertOutcome::ScanGone);
    }

    let hash = uri_hash(uri);
    let inserted = conn.execute(
        "INSERT INTO pages (scans_id, sites_id, uri, uri_hash) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(scans_id, uri_hash) DO NOTHING",
        params![scans_id, sites_id, uri, hash],
    )?;

    if inserted == 0 {
        return Ok(InsertOutcome::AlreadyExists);
    }

    Ok(InsertOutcome::Created(PageRecord {
        id: conn.last_insert_rowid(),
        scans_id,
        sites_id,
        uri: uri.to_string(),
        uri_hash: hash,
    }))
}

fn insert_job_row(
    conn: &Connection,
    job_type: JobType,
    pages_id: i64,
    priority: u32,
) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO jobs (job_type, pages_id, priority, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            job_type.to_db_string(),
            pages_id,
            priority,
            JobStatus::Pending.to_db_string(),
            now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Storage for SqliteStorage {
    // ===== Site Registry =====

    fn insert_site(&mut self, base_url: &str) -> StorageResult<SiteRecord> {
        self.conn.execute(
            "INSERT OR IGNORE INTO sites (base_url) VALUES (?1)",
            params![base_url],
        )?;

        let site = self.conn.query_row(
            "SELECT id, base_url FROM sites WHERE base_url = ?1",
            params![base_url],
            site_from_row,
        )?;

        Ok(site)
    }

    fn get_site(&self, site_id: i64) -> StorageResult<Option<SiteRecord>> {
        let site = self
            .conn
            .query_row(
                "SELECT id, base_url FROM sites WHERE id = ?1",
                params![site_id],
                site_from_row,
            )
            .optional()?;
        Ok(site)
    }

    fn list_sites(&self) -> StorageResult<Vec<SiteRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, base_url FROM sites ORDER BY id")?;

        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sites)
    }

    fn closest_site_for_url(&self, url: &str) -> StorageResult<Option<SiteRecord>> {
        // Longest matching base URL wins, so nested sites own their subtree
        let closest = self
            .list_sites()?
            .into_iter()
            .filter(|site| is_within_base(&site.base_url, url))
            .max_by_key(|site| site.base_url.len());

        Ok(closest)
    }

    fn update_site_base_url(&mut self, site_id: i64, base_url: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE sites SET base_url = ?1 WHERE id = ?2",
            params![base_url, site_id],
        )?;

        if updated == 0 {
            return Err(StorageError::SiteNotFound(site_id));
        }
        Ok(())
    }

    // ===== Scan Management =====

    fn insert_scan(&mut self, sites_id: i64, details: &ScanDetails) -> StorageResult<ScanRecord> {
        let start_time = now();
        self.conn.execute(
            "INSERT INTO scans (sites_id, gpa, status, scan_type, start_time) VALUES (?1, 0, ?2, ?3, ?4)",
            params![
                sites_id,
                ScanStatus::Created.to_db_string(),
                details.scan_type.to_db_string(),
                start_time
            ],
        )?;

        Ok(ScanRecord {
            id: self.conn.last_insert_rowid(),
            sites_id,
            gpa: 0.0,
            status: ScanStatus::Created,
            scan_type: details.scan_type,
            start_time,
            end_time: None,
            error: None,
        })
    }

    fn get_scan(&self, scan_id: i64) -> StorageResult<Option<ScanRecord>> {
        let scan = self
            .conn
            .query_row(
                &format!("SELECT {} FROM scans WHERE id = ?1", SCAN_COLUMNS),
                params![scan_id],
                scan_from_row,
            )
            .optional()?;
        Ok(scan)
    }

    fn list_scans(&self) -> StorageResult<Vec<ScanRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM scans ORDER BY id DESC", SCAN_COLUMNS))?;

        let scans = stmt
            .query_map([], scan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scans)
    }

    fn get_active_scans_for_site(&self, sites_id: i64) -> StorageResult<Vec<ScanRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM scans WHERE sites_id = ?1 AND status NOT IN (?2, ?3) ORDER BY id",
            SCAN_COLUMNS
        ))?;

        let scans = stmt
            .query_map(
                params![
                    sites_id,
                    ScanStatus::Complete.to_db_string(),
                    ScanStatus::Error.to_db_string()
                ],
                scan_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(scans)
    }

    fn update_scan_status(
        &mut self,
        scan_id: i64,
        status: ScanStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let current = self
            .get_scan(scan_id)?
            .ok_or(StorageError::ScanNotFound(scan_id))?;

        if !current.status.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let end_time = status.is_terminal().then(now);
        let error: Option<String> = match status {
            ScanStatus::Error => error.map(|e| e.chars().take(MAX_SCAN_ERROR_LEN).collect()),
            _ => None,
        };

        self.conn.execute(
            "UPDATE scans SET status = ?1, end_time = COALESCE(?2, end_time), error = COALESCE(?3, error)
             WHERE id = ?4",
            params![status.to_db_string(), end_time, error, scan_id],
        )?;
        Ok(())
    }

    fn delete_scan(&mut self, scan_id: i64) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM jobs WHERE pages_id IN (SELECT id FROM pages WHERE scans_id = ?1)",
            params![scan_id],
        )?;
        tx.execute("DELETE FROM pages WHERE scans_id = ?1", params![scan_id])?;
        let deleted = tx.execute("DELETE FROM scans WHERE id = ?1", params![scan_id])?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    fn count_scans_by_status(&self, status: ScanStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM scans WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Page Management =====

    fn insert_page_if_absent(
        &mut self,
        scans_id: i64,
        sites_id: i64,
        uri: &str,
    ) -> StorageResult<InsertOutcome<PageRecord>> {
        insert_page_row(&self.conn, scans_id, sites_id, uri)
    }

    fn insert_page_with_job(
        &mut self,
        scans_id: i64,
        sites_id: i64,
        uri: &str,
        priority: u32,
    ) -> StorageResult<InsertOutcome<(PageRecord, i64)>> {
        let tx = self.conn.transaction()?;

        let outcome = match insert_page_row(&tx, scans_id, sites_id, uri)? {
            InsertOutcome::Created(page) => {
                let job_id = insert_job_row(&tx, JobType::PageScan, page.id, priority)?;
                InsertOutcome::Created((page, job_id))
            }
            InsertOutcome::AlreadyExists => InsertOutcome::AlreadyExists,
            InsertOutcome::ScanGone => InsertOutcome::ScanGone,
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn get_page(&self, page_id: i64) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                "SELECT id, scans_id, sites_id, uri, uri_hash FROM pages WHERE id = ?1",
                params![page_id],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn get_page_by_scan_and_uri(
        &self,
        scans_id: i64,
        uri: &str,
    ) -> StorageResult<Option<PageRecord>> {
        let page = self
            .conn
            .query_row(
                "SELECT id, scans_id, sites_id, uri, uri_hash FROM pages
                 WHERE scans_id = ?1 AND uri_hash = ?2",
                params![scans_id, uri_hash(uri)],
                page_from_row,
            )
            .optional()?;
        Ok(page)
    }

    fn update_page_uri(&mut self, page_id: i64, uri: &str) -> StorageResult<bool> {
        let result = self.conn.execute(
            "UPDATE pages SET uri = ?1, uri_hash = ?2 WHERE id = ?3",
            params![uri, uri_hash(uri), page_id],
        );

        match result {
            Ok(0) => Err(StorageError::PageNotFound(page_id)),
            Ok(_) => Ok(true),
            Err(e) if is_constraint_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn count_pages_for_scan(&self, scans_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE scans_id = ?1",
            params![scans_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Job Queue =====

    fn enqueue_job(
        &mut self,
        job_type: JobType,
        pages_id: i64,
        priority: u32,
    ) -> StorageResult<i64> {
        insert_job_row(&self.conn, job_type, pages_id, priority)
    }

    fn claim_next_job(&mut self) -> StorageResult<Option<JobRecord>> {
        let tx = self.conn.transaction()?;

        let job_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM jobs WHERE status = ?1 ORDER BY priority DESC, id ASC LIMIT 1",
                params![JobStatus::Pending.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        let job = match job_id {
            Some(id) => {
                tx.execute(
                    "UPDATE jobs SET status = ?1, attempts = attempts + 1 WHERE id = ?2",
                    params![JobStatus::Running.to_db_string(), id],
                )?;
                Some(tx.query_row(
                    &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                    params![id],
                    job_from_row,
                )?)
            }
            None => None,
        };

        tx.commit()?;
        Ok(job)
    }

    fn finish_job(
        &mut self,
        job_id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let finished_at = status.is_finished().then(now);
        // The job may already be gone with its scan; that is not an error
        self.conn.execute(
            "UPDATE jobs SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), error, finished_at, job_id],
        )?;
        Ok(())
    }

    fn requeue_interrupted_jobs(&mut self) -> StorageResult<u64> {
        let requeued = self.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE status = ?2",
            params![
                JobStatus::Pending.to_db_string(),
                JobStatus::Running.to_db_string()
            ],
        )?;
        Ok(requeued as u64)
    }

    fn get_jobs_for_page(&self, pages_id: i64) -> StorageResult<Vec<JobRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE pages_id = ?1 ORDER BY id",
            JOB_COLUMNS
        ))?;

        let jobs = stmt
            .query_map(params![pages_id], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(jobs)
    }

    fn get_root_job_for_scan(&self, scans_id: i64) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs
                     WHERE pages_id = (SELECT MIN(id) FROM pages WHERE scans_id = ?1)
                     ORDER BY id DESC LIMIT 1",
                    JOB_COLUMNS
                ),
                params![scans_id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    fn count_open_jobs_for_scan(&self, scans_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs j JOIN pages p ON p.id = j.pages_id
             WHERE p.scans_id = ?1 AND j.status IN (?2, ?3)",
            params![
                scans_id,
                JobStatus::Pending.to_db_string(),
                JobStatus::Running.to_db_string()
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_jobs_by_status(&self, status: JobStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
