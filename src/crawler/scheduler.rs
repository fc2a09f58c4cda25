//! Crawl scheduler: frontier expansion
//!
//! After a page has been downloaded, every in-scope link found on it becomes a
//! page of the same scan, unless the scan already has one for that URI. Each
//! new page is queued at the page tier of the scan's type.

use crate::scan::{create_and_schedule_page, get_page_by_scan_and_uri};
use crate::state::Tier;
use crate::storage::{InsertOutcome, PageRecord, ScanRecord, SiteRecord, Storage, StorageResult};
use std::collections::BTreeSet;

/// Creates and schedules pages for the novel links of a downloaded page
///
/// Running it again with the same links creates nothing: existing pages are
/// skipped, and the storage uniqueness constraint settles races with other
/// tasks. If the scan has been deleted nothing is written.
///
/// # Arguments
///
/// * `storage` - The storage backend
/// * `scan` - The scan being crawled
/// * `site` - The scan's site
/// * `page` - The page the links were found on
/// * `links` - Candidate URIs, already filtered to the site
///
/// # Returns
///
/// The number of pages newly scheduled
pub fn expand_frontier<S: Storage>(
    storage: &mut S,
    scan: &ScanRecord,
    site: &SiteRecord,
    page: &PageRecord,
    links: &BTreeSet<String>,
) -> StorageResult<usize> {
    let mut scheduled = 0;

    for uri in links {
        if get_page_by_scan_and_uri(&*storage, scan.id, uri)?.is_some() {
            continue;
        }

        match create_and_schedule_page(storage, scan, uri, Tier::Page)? {
            InsertOutcome::Created(_) => scheduled += 1,
            InsertOutcome::AlreadyExists => {}
            InsertOutcome::ScanGone => {
                tracing::debug!(scan_id = scan.id, "Scan deleted, stopping frontier expansion");
                return Ok(scheduled);
            }
        }
    }

    if scheduled > 0 {
        tracing::debug!(
            scan_id = scan.id,
            site_id = site.id,
            page_id = page.id,
            "Scheduled {} new pages from {}",
            scheduled,
            page.uri
        );
    }

    Ok(scheduled)
}
