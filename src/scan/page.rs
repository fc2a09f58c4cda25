use crate::state::{Priority, Tier};
use crate::storage::{
    InsertOutcome, JobType, PageRecord, ScanRecord, Storage, StorageResult,
};

/// Creates a page for a URI unless the scan already has one
pub fn create_new_page<S: Storage>(
    storage: &mut S,
    scans_id: i64,
    sites_id: i64,
    uri: &str,
) -> StorageResult<InsertOutcome<PageRecord>> {
    storage.insert_page_if_absent(scans_id, sites_id, uri)
}

/// Queues the download job of an existing page
///
/// # Returns
///
/// The id of the new job
pub fn schedule_page<S: Storage>(
    storage: &mut S,
    page: &PageRecord,
    priority: Priority,
) -> StorageResult<i64> {
    let job_id = storage.enqueue_job(JobType::PageScan, page.id, priority.value())?;
    tracing::debug!(
        page_id = page.id,
        job_id,
        priority = priority.value(),
        "Scheduled page {}",
        page.uri
    );
    Ok(job_id)
}

/// Creates a page and queues its download job in one step
///
/// The priority follows the scan's type and the page's tier. Nothing is
/// written if the page already exists or the scan has been deleted.
pub fn create_and_schedule_page<S: Storage>(
    storage: &mut S,
    scan: &ScanRecord,
    uri: &str,
    tier: Tier,
) -> StorageResult<InsertOutcome<(PageRecord, i64)>> {
    let priority = Priority::for_scan(scan.scan_type, tier);
    let outcome = storage.insert_page_with_job(scan.id, scan.sites_id, uri, priority.value())?;

    if let InsertOutcome::Created((page, job_id)) = &outcome {
        tracing::debug!(
            scan_id = scan.id,
            page_id = page.id,
            job_id,
            priority = priority.value(),
            "Scheduled page {}",
            uri
        );
    }

    Ok(outcome)
}

/// Looks a page up by scan and exact URI
pub fn get_page_by_scan_and_uri<S: Storage>(
    storage: &S,
    scans_id: i64,
    uri: &str,
) -> StorageResult<Option<PageRecord>> {
    storage.get_page_by_scan_and_uri(scans_id, uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ScanType;
    use crate::storage::{JobStatus, ScanDetails, SqliteStorage};

    fn setup(scan_type: ScanType) -> (SqliteStorage, ScanRecord) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let site = storage.insert_site("http://example.com/").unwrap();
        let scan = storage
            .insert_scan(site.id, &ScanDetails { scan_type })
            .unwrap();
        (storage, scan)
    }

    #[test]
    fn test_create_new_page_twice_yields_one_page() {
        let (mut storage, scan) = setup(ScanType::Auto);

        let first = create_new_page(&mut storage, scan.id, scan.sites_id, "http://example.com/a")
            .unwrap();
        let second = create_new_page(&mut storage, scan.id, scan.sites_id, "http://example.com/a")
            .unwrap();

        assert!(matches!(first, InsertOutcome::Created(_)));
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(storage.count_pages_for_scan(scan.id).unwrap(), 1);
    }

    #[test]
    fn test_schedule_page_uses_given_priority() {
        let (mut storage, scan) = setup(ScanType::Auto);
        let page = create_new_page(&mut storage, scan.id, scan.sites_id, "http://example.com/")
            .unwrap()
            .created()
            .unwrap();

        schedule_page(&mut storage, &page, Priority::AutoSiteScan).unwrap();

        let jobs = storage.get_jobs_for_page(page.id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].priority, 400);
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[test]
    fn test_create_and_schedule_page_priority_by_scan_type() {
        let (mut storage, scan) = setup(ScanType::User);

        let (root, _) = create_and_schedule_page(&mut storage, &scan, "http://example.com/", Tier::Site)
            .unwrap()
            .created()
            .unwrap();
        let (child, _) =
            create_and_schedule_page(&mut storage, &scan, "http://example.com/a", Tier::Page)
                .unwrap()
                .created()
                .unwrap();

        assert_eq!(storage.get_jobs_for_page(root.id).unwrap()[0].priority, 200);
        assert_eq!(storage.get_jobs_for_page(child.id).unwrap()[0].priority, 100);
    }

    #[test]
    fn test_get_page_by_scan_and_uri() {
        let (mut storage, scan) = setup(ScanType::Auto);
        assert!(get_page_by_scan_and_uri(&storage, scan.id, "http://example.com/")
            .unwrap()
            .is_none());

        create_new_page(&mut storage, scan.id, scan.sites_id, "http://example.com/").unwrap();

        let page = get_page_by_scan_and_uri(&storage, scan.id, "http://example.com/")
            .unwrap()
            .unwrap();
        assert_eq!(page.uri, "http://example.com/");
    }
}
