//! Worker pool - drains the job queue
//!
//! This module runs queued page jobs until none are left, including:
//! - Requeueing jobs a crashed process left running
//! - Running up to `workers` page jobs at once, each as its own task
//! - Download, link extraction and frontier expansion for every page
//! - Recording job outcomes and finishing scans whose jobs are all done

use crate::crawler::downloader::{Downloader, RetryPolicy};
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::parser::extract_crawlable_links;
use crate::crawler::scheduler::expand_frontier;
use crate::state::ScanStatus;
use crate::storage::{
    lock, JobRecord, JobStatus, PageRecord, ScanRecord, SharedStorage, SiteRecord, Storage,
    StorageError,
};
use crate::url::uri_base;
use crate::AuditError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// How a page job ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageProgress {
    /// The page was downloaded and `scheduled` new pages were queued
    Crawled { scheduled: usize },
    /// The content type was not HTML
    Skipped,
    /// The page or its scan no longer exists
    Vanished,
}

/// Counters for one run of the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub requeued: u64,
    pub done: u64,
    pub failed: u64,
    pub superseded: u64,
    pub pages_scheduled: u64,
}

impl PoolSummary {
    pub fn jobs_run(&self) -> u64 {
        self.done + self.failed + self.superseded
    }

    fn record(&mut self, status: JobStatus, progress: Option<PageProgress>) {
        match status {
            JobStatus::Done => self.done += 1,
            JobStatus::Superseded => self.superseded += 1,
            _ => self.failed += 1,
        }
        if let Some(PageProgress::Crawled { scheduled }) = progress {
            self.pages_scheduled += scheduled as u64;
        }
    }
}

/// Maps the result of a page job to the job's final status and error text
pub fn job_outcome(result: &crate::Result<PageProgress>) -> (JobStatus, Option<String>) {
    match result {
        Ok(PageProgress::Vanished) => (JobStatus::Superseded, None),
        Ok(_) => (JobStatus::Done, None),
        Err(e) if e.is_superseded() => (JobStatus::Superseded, Some(e.to_string())),
        Err(e) => (JobStatus::Failed, Some(e.to_string())),
    }
}

/// Runs page jobs from storage with bounded concurrency
pub struct WorkerPool<F, S> {
    storage: SharedStorage<S>,
    downloader: Arc<Downloader<F, S>>,
    workers: usize,
}

impl<F, S> WorkerPool<F, S>
where
    F: PageFetcher + 'static,
    S: Storage + Send + 'static,
{
    /// Creates a pool
    ///
    /// # Arguments
    ///
    /// * `storage` - The shared storage handle
    /// * `fetcher` - How pages are fetched
    /// * `policy` - Fragment retry policy for the downloader
    /// * `workers` - Maximum number of jobs running at once
    pub fn new(storage: SharedStorage<S>, fetcher: F, policy: RetryPolicy, workers: usize) -> Self {
        let downloader = Arc::new(Downloader::new(fetcher, Arc::clone(&storage), policy));
        Self {
            storage,
            downloader,
            workers: workers.max(1),
        }
    }

    /// Runs jobs until the queue is empty and no job is in flight
    ///
    /// A failing job never stops the pool; only storage failures while
    /// claiming work do.
    pub async fn run_until_idle(&self) -> crate::Result<PoolSummary> {
        let mut summary = PoolSummary::default();

        summary.requeued = lock(&self.storage)?.requeue_interrupted_jobs()?;
        if summary.requeued > 0 {
            tracing::info!("Requeued {} interrupted jobs", summary.requeued);
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        loop {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| AuditError::UnexpectedValue(format!("worker semaphore closed: {}", e)))?;

            let next = lock(&self.storage)?.claim_next_job()?;

            if let Some(job) = next {
                let storage = Arc::clone(&self.storage);
                let downloader = Arc::clone(&self.downloader);
                tasks.spawn(async move {
                    let _permit = permit;
                    run_job(storage, downloader, job).await
                });

                // Finished tasks hold no permit; collect them so the set stays small
                while tasks.len() > self.workers {
                    if let Some(joined) = tasks.join_next().await {
                        record_joined(&mut summary, joined);
                    }
                }
                continue;
            }

            drop(permit);

            // Nothing claimable: an in-flight job may still add pages
            match tasks.join_next().await {
                Some(joined) => record_joined(&mut summary, joined),
                None => break,
            }
        }

        tracing::info!(
            done = summary.done,
            failed = summary.failed,
            superseded = summary.superseded,
            "Job queue drained"
        );

        Ok(summary)
    }
}

fn record_joined(
    summary: &mut PoolSummary,
    joined: Result<(JobStatus, Option<PageProgress>), tokio::task::JoinError>,
) {
    match joined {
        Ok((status, progress)) => summary.record(status, progress),
        Err(e) => {
            tracing::error!("Page job task panicked: {}", e);
            summary.record(JobStatus::Failed, None);
        }
    }
}

/// Runs one job and records its outcome
async fn run_job<F, S>(
    storage: SharedStorage<S>,
    downloader: Arc<Downloader<F, S>>,
    job: JobRecord,
) -> (JobStatus, Option<PageProgress>)
where
    F: PageFetcher,
    S: Storage,
{
    let result = process_page(&storage, &downloader, job.pages_id).await;
    let (status, error) = job_outcome(&result);

    match &result {
        Ok(progress) => tracing::debug!(job_id = job.id, ?progress, "Job finished"),
        Err(e) if e.is_superseded() => tracing::info!(job_id = job.id, "Job superseded: {}", e),
        Err(e) if e.is_expected() => tracing::debug!(job_id = job.id, "Page abandoned: {}", e),
        Err(e) => tracing::warn!(job_id = job.id, "Page job failed: {}", e),
    }

    if let Err(e) = finish(&storage, &job, status, error.as_deref(), &result) {
        tracing::warn!(job_id = job.id, "Failed to record job outcome: {}", e);
    }

    (status, result.ok())
}

/// Downloads one page and expands the frontier from it
async fn process_page<F, S>(
    storage: &SharedStorage<S>,
    downloader: &Downloader<F, S>,
    pages_id: i64,
) -> crate::Result<PageProgress>
where
    F: PageFetcher,
    S: Storage,
{
    let loaded = {
        let mut storage = lock(storage)?;
        load_page(&mut *storage, pages_id)?
    };

    let Some((site, scan, page)) = loaded else {
        return Ok(PageProgress::Vanished);
    };

    let body = downloader.download(&site, &scan, &page, &page.uri).await?;
    let Some(html) = body else {
        return Ok(PageProgress::Skipped);
    };

    let mut storage = lock(storage)?;

    // Reconciliation may have moved the page
    let Some(page) = storage.get_page(page.id)? else {
        return Ok(PageProgress::Vanished);
    };

    let links = extract_crawlable_links(&site.base_url, &uri_base(&page.uri), &page.uri, &html);
    let scheduled = expand_frontier(&mut *storage, &scan, &site, &page, &links)?;

    Ok(PageProgress::Crawled { scheduled })
}

type LoadedPage = (SiteRecord, ScanRecord, PageRecord);

/// Loads a page with its scan and site, marking the scan RUNNING
fn load_page<S: Storage>(storage: &mut S, pages_id: i64) -> crate::Result<Option<LoadedPage>> {
    let Some(page) = storage.get_page(pages_id)? else {
        return Ok(None);
    };
    let Some(mut scan) = storage.get_scan(page.scans_id)? else {
        return Ok(None);
    };
    let site = storage
        .get_site(scan.sites_id)?
        .ok_or(StorageError::SiteNotFound(scan.sites_id))?;

    if scan.status == ScanStatus::Queued {
        storage.update_scan_status(scan.id, ScanStatus::Running, None)?;
        scan.status = ScanStatus::Running;
        tracing::info!(scan_id = scan.id, "Scan of {} running", site.base_url);
    }

    Ok(Some((site, scan, page)))
}

/// Records the job status, then finishes the scan if it has no open jobs left
fn finish<S: Storage>(
    storage: &SharedStorage<S>,
    job: &JobRecord,
    status: JobStatus,
    error: Option<&str>,
    result: &crate::Result<PageProgress>,
) -> crate::Result<()> {
    let mut storage = lock(storage)?;
    storage.finish_job(job.id, status, error)?;

    if matches!(result, Ok(PageProgress::Vanished)) {
        return Ok(());
    }

    // The page may be gone with a replaced scan
    let Some(page) = storage.get_page(job.pages_id)? else {
        return Ok(());
    };

    finish_scan_if_idle(&mut *storage, page.scans_id)
}

/// Moves a scan to COMPLETE, or ERROR if its root page failed, once no job is open
pub fn finish_scan_if_idle<S: Storage>(storage: &mut S, scan_id: i64) -> crate::Result<()> {
    let Some(scan) = storage.get_scan(scan_id)? else {
        return Ok(());
    };

    if scan.status.is_terminal() || storage.count_open_jobs_for_scan(scan_id)? > 0 {
        return Ok(());
    }

    let root_job = storage.get_root_job_for_scan(scan_id)?;
    match root_job {
        Some(job) if job.status == JobStatus::Failed => {
            let error = job.error.unwrap_or_else(|| "root page failed".to_string());
            storage.update_scan_status(scan_id, ScanStatus::Error, Some(&error))?;
            tracing::warn!(scan_id, "Scan failed: {}", error);
        }
        _ => {
            storage.update_scan_status(scan_id, ScanStatus::Complete, None)?;
            let pages = storage.count_pages_for_scan(scan_id)?;
            tracing::info!(scan_id, pages, "Scan complete");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::FetchResult;
    use crate::scan::schedule_site_scan;
    use crate::state::ScanType;
    use crate::storage::SqliteStorage;
    use crate::DownloadError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves fixed HTML per URI; unknown URIs fail like a refused connection
    struct StaticSite {
        pages: HashMap<String, (String, String)>,
    }

    impl StaticSite {
        fn new(pages: &[(&str, &str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(uri, effective, html)| {
                        (uri.to_string(), (effective.to_string(), html.to_string()))
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for StaticSite {
        async fn fetch(&self, uri: &str) -> crate::Result<FetchResult> {
            match self.pages.get(uri) {
                Some((effective, html)) => Ok(FetchResult::Html {
                    effective_url: effective.clone(),
                    body: html.clone(),
                }),
                None => Err(AuditError::Network {
                    uri: uri.to_string(),
                    source: "connection refused".into(),
                }),
            }
        }
    }

    fn setup(scan_type: ScanType) -> (SharedStorage<SqliteStorage>, SiteRecord, i64) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let site = storage.insert_site("http://site/").unwrap();
        let scan = schedule_site_scan(&mut storage, &site, scan_type).unwrap();
        (Arc::new(Mutex::new(storage)), site, scan.id)
    }

    fn pool(storage: &SharedStorage<SqliteStorage>, site: StaticSite) -> WorkerPool<StaticSite, SqliteStorage> {
        let policy = RetryPolicy {
            delay: Duration::from_millis(1),
            max_fragment_retries: 1,
        };
        WorkerPool::new(Arc::clone(storage), site, policy, 2)
    }

    #[test]
    fn test_job_outcome_mapping() {
        let done: crate::Result<PageProgress> = Ok(PageProgress::Crawled { scheduled: 3 });
        assert_eq!(job_outcome(&done), (JobStatus::Done, None));

        let skipped: crate::Result<PageProgress> = Ok(PageProgress::Skipped);
        assert_eq!(job_outcome(&skipped).0, JobStatus::Done);

        let vanished: crate::Result<PageProgress> = Ok(PageProgress::Vanished);
        assert_eq!(job_outcome(&vanished).0, JobStatus::Superseded);

        let upgraded: crate::Result<PageProgress> = Err(DownloadError::BaseUrlUpgraded {
            base_url: "https://site/".to_string(),
        }
        .into());
        assert_eq!(job_outcome(&upgraded).0, JobStatus::Superseded);

        let off_site: crate::Result<PageProgress> = Err(DownloadError::OffSite {
            effective: "http://other/".to_string(),
        }
        .into());
        let (status, error) = job_outcome(&off_site);
        assert_eq!(status, JobStatus::Failed);
        assert!(error.unwrap().contains("http://other/"));
    }

    #[tokio::test]
    async fn test_pool_crawls_site_and_completes_scan() {
        let (storage, _site, scan_id) = setup(ScanType::Auto);
        let site = StaticSite::new(&[
            (
                "http://site/",
                "http://site/",
                r#"<a href="/a">A</a><a href="/b">B</a><a href="http://elsewhere/">X</a>"#,
            ),
            ("http://site/a", "http://site/a", r#"<a href="/b">B</a><a href="/">Home</a>"#),
            ("http://site/b", "http://site/b", "<p>leaf</p>"),
        ]);

        let summary = pool(&storage, site).run_until_idle().await.unwrap();

        assert_eq!(summary.done, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.pages_scheduled, 2);

        let storage = storage.lock().unwrap();
        let scan = storage.get_scan(scan_id).unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Complete);
        assert!(scan.end_time.is_some());
        assert_eq!(storage.count_pages_for_scan(scan_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_child_does_not_fail_scan() {
        let (storage, _site, scan_id) = setup(ScanType::Auto);
        let site = StaticSite::new(&[(
            "http://site/",
            "http://site/",
            r#"<a href="/missing">Gone</a>"#,
        )]);

        let summary = pool(&storage, site).run_until_idle().await.unwrap();

        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
        let storage = storage.lock().unwrap();
        assert_eq!(
            storage.get_scan(scan_id).unwrap().unwrap().status,
            ScanStatus::Complete
        );
    }

    #[tokio::test]
    async fn test_failed_root_fails_scan() {
        let (storage, _site, scan_id) = setup(ScanType::Auto);

        let summary = pool(&storage, StaticSite::new(&[]))
            .run_until_idle()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        let storage = storage.lock().unwrap();
        let scan = storage.get_scan(scan_id).unwrap().unwrap();
        assert_eq!(scan.status, ScanStatus::Error);
        assert!(scan.error.unwrap().contains("http://site/"));
    }

    #[tokio::test]
    async fn test_base_url_upgrade_supersedes_and_rescans() {
        let (storage, site, old_scan_id) = setup(ScanType::User);
        let fetcher = StaticSite::new(&[
            ("http://site/", "https://site/", "<p>moved</p>"),
            ("https://site/", "https://site/", r#"<a href="/a">A</a>"#),
            ("https://site/a", "https://site/a", "<p>leaf</p>"),
        ]);

        let summary = pool(&storage, fetcher).run_until_idle().await.unwrap();

        assert_eq!(summary.superseded, 1);
        assert_eq!(summary.done, 2);

        let storage = storage.lock().unwrap();
        assert!(storage.get_scan(old_scan_id).unwrap().is_none());
        assert_eq!(
            storage.get_site(site.id).unwrap().unwrap().base_url,
            "https://site/"
        );

        let scans = storage.list_scans().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].scan_type, ScanType::User);
        assert_eq!(scans[0].status, ScanStatus::Complete);
        assert_eq!(storage.count_pages_for_scan(scans[0].id).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_jobs_are_redelivered() {
        let (storage, _site, scan_id) = setup(ScanType::Auto);
        {
            let mut storage = storage.lock().unwrap();
            storage.claim_next_job().unwrap().unwrap();
        }
        let site = StaticSite::new(&[("http://site/", "http://site/", "<p>home</p>")]);

        let summary = pool(&storage, site).run_until_idle().await.unwrap();

        assert_eq!(summary.requeued, 1);
        assert_eq!(summary.done, 1);
        let storage = storage.lock().unwrap();
        assert_eq!(
            storage.get_scan(scan_id).unwrap().unwrap().status,
            ScanStatus::Complete
        );
    }

    #[test]
    fn test_finish_scan_waits_for_open_jobs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let site = storage.insert_site("http://site/").unwrap();
        let scan = schedule_site_scan(&mut storage, &site, ScanType::Auto).unwrap();

        finish_scan_if_idle(&mut storage, scan.id).unwrap();
        assert_eq!(
            storage.get_scan(scan.id).unwrap().unwrap().status,
            ScanStatus::Queued
        );
    }
}
