use crate::scan::lifecycle::{create_new_scan, schedule_scan};
use crate::state::ScanType;
use crate::storage::{ScanDetails, ScanRecord, SiteRecord, Storage, StorageError, StorageResult};
use crate::url::{canonical_base_url, without_scheme};

/// Registers a site under its canonical base URL
///
/// Registering the same site twice returns the existing record. The scheme
/// is not part of a site's identity: once a site has been upgraded to https,
/// registering its http base URL again returns the upgraded site.
///
/// # Arguments
///
/// * `storage` - The storage backend
/// * `base_url` - The site's root URL as written by the user
///
/// # Returns
///
/// * `Ok(SiteRecord)` - The registered site
/// * `Err(AuditError)` - The URL is not an http(s) URL with a host, or the write failed
pub fn register_site<S: Storage>(storage: &mut S, base_url: &str) -> crate::Result<SiteRecord> {
    let canonical = canonical_base_url(base_url)?;

    let existing = storage
        .list_sites()?
        .into_iter()
        .find(|site| without_scheme(&site.base_url) == without_scheme(&canonical));
    if let Some(site) = existing {
        if site.base_url != canonical {
            tracing::debug!(site_id = site.id, "{} is registered as {}", canonical, site.base_url);
        }
        return Ok(site);
    }

    let site = storage.insert_site(&canonical)?;
    tracing::debug!(site_id = site.id, "Registered site {}", site.base_url);
    Ok(site)
}

/// Creates a scan of the given type for a site and schedules it
///
/// # Returns
///
/// The new scan, as stored after scheduling (QUEUED)
pub fn schedule_site_scan<S: Storage>(
    storage: &mut S,
    site: &SiteRecord,
    scan_type: ScanType,
) -> StorageResult<ScanRecord> {
    let scan = create_new_scan(storage, site.id, &ScanDetails { scan_type })?;
    schedule_scan(storage, &scan)?;

    storage
        .get_scan(scan.id)?
        .ok_or(StorageError::ScanNotFound(scan.id))
}

/// Returns true if the site has a scan that has not finished
pub fn has_active_scan<S: Storage>(storage: &S, site_id: i64) -> StorageResult<bool> {
    Ok(!storage.get_active_scans_for_site(site_id)?.is_empty())
}
