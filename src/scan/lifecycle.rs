//! Scan creation, scheduling, deletion and replacement

use crate::scan::page::{create_and_schedule_page, schedule_page};
use crate::scan::site::schedule_site_scan;
use crate::state::{Priority, ScanStatus, Tier};
use crate::storage::{
    InsertOutcome, ScanDetails, ScanRecord, SiteRecord, Storage, StorageError, StorageResult,
};
use crate::url::downgrade_to_http;

/// Creates a scan for a site
///
/// The scan starts CREATED with a zero GPA, the requested scan type (AUTO
/// unless given) and the current time as its start time.
pub fn create_new_scan<S: Storage>(
    storage: &mut S,
    sites_id: i64,
    details: &ScanDetails,
) -> StorageResult<ScanRecord> {
    let scan = storage.insert_scan(sites_id, details)?;
    tracing::debug!(
        scan_id = scan.id,
        site_id = sites_id,
        scan_type = %scan.scan_type,
        "Created scan"
    );
    Ok(scan)
}

/// Schedules the root page of a CREATED scan and moves the scan to QUEUED
///
/// The status is re-read from storage, so a stale `scan` value cannot schedule
/// twice.
///
/// # Returns
///
/// * `Ok(Some(job_id))` - The root page job was queued
/// * `Ok(None)` - The scan is not CREATED (or no longer exists); nothing was written
/// * `Err(StorageError)` - The site is missing or a write failed
pub fn schedule_scan<S: Storage>(storage: &mut S, scan: &ScanRecord) -> StorageResult<Option<i64>> {
    let current = match storage.get_scan(scan.id)? {
        Some(current) => current,
        None => return Ok(None),
    };

    if current.status != ScanStatus::Created {
        tracing::debug!(
            scan_id = current.id,
            status = %current.status,
            "Scan already scheduled"
        );
        return Ok(None);
    }

    let site = storage
        .get_site(current.sites_id)?
        .ok_or(StorageError::SiteNotFound(current.sites_id))?;

    let job_id = match create_and_schedule_page(storage, &current, &site.base_url, Tier::Site)? {
        InsertOutcome::Created((_, job_id)) => job_id,
        InsertOutcome::AlreadyExists => {
            // An earlier call created the root page but never reached QUEUED
            let page = storage
                .get_page_by_scan_and_uri(current.id, &site.base_url)?
                .ok_or_else(|| {
                    StorageError::Database(format!("root page of scan {} vanished", current.id))
                })?;
            match storage.get_jobs_for_page(page.id)?.last() {
                Some(job) => job.id,
                None => schedule_page(
                    storage,
                    &page,
                    Priority::for_scan(current.scan_type, Tier::Site),
                )?,
            }
        }
        InsertOutcome::ScanGone => return Ok(None),
    };

    storage.update_scan_status(current.id, ScanStatus::Queued, None)?;

    tracing::info!(
        scan_id = current.id,
        site_id = site.id,
        scan_type = %current.scan_type,
        "Scheduled scan of {}",
        site.base_url
    );

    Ok(Some(job_id))
}

/// Deletes a scan with all of its pages and their queued jobs
///
/// Returns false if the scan did not exist.
pub fn delete_scan<S: Storage>(storage: &mut S, scan_id: i64) -> StorageResult<bool> {
    let deleted = storage.delete_scan(scan_id)?;
    if deleted {
        tracing::info!(scan_id, "Deleted scan");
    }
    Ok(deleted)
}

/// Moves a site to its https base URL and restarts its scan
///
/// The site's base URL becomes `https_base_url`, the running scan is deleted
/// and a new scan of the same type is scheduled. Callers sharing storage must
/// hold its lock across this call.
///
/// # Returns
///
/// * `Ok(Some(scan))` - The replacement scan
/// * `Ok(None)` - Another task already upgraded the site or removed the scan;
///   nothing was written
pub fn replace_scan_after_upgrade<S: Storage>(
    storage: &mut S,
    site_id: i64,
    scan_id: i64,
    https_base_url: &str,
) -> StorageResult<Option<ScanRecord>> {
    let site = storage
        .get_site(site_id)?
        .ok_or(StorageError::SiteNotFound(site_id))?;

    if downgrade_to_http(https_base_url) != site.base_url {
        tracing::debug!(
            site_id,
            "Base URL of site already changed to {}",
            site.base_url
        );
        return Ok(None);
    }

    let scan_type = match storage.get_scan_type(scan_id)? {
        Some(scan_type) => scan_type,
        None => return Ok(None),
    };

    storage.update_site_base_url(site.id, https_base_url)?;
    storage.delete_scan(scan_id)?;

    let site = SiteRecord {
        base_url: https_base_url.to_string(),
        ..site
    };
    let replacement = schedule_site_scan(storage, &site, scan_type)?;

    tracing::info!(
        notice = true,
        site_id = site.id,
        old_scan_id = scan_id,
        new_scan_id = replacement.id,
        "base_url upgraded to https for {}",
        site.base_url
    );

    Ok(Some(replacement))
}
