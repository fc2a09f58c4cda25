//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! schedule, download, reconcile and expand cycle until the queue drains.

use site_auditor::config::{Config, CrawlerConfig, OutputConfig, SiteEntry, UserAgentConfig};
use site_auditor::crawler::{run_queue, PoolSummary};
use site_auditor::output::load_statistics;
use site_auditor::scan::{register_site, schedule_site_scan};
use site_auditor::state::{ScanStatus, ScanType};
use site_auditor::storage::{
    lock, JobStatus, ScanRecord, SharedStorage, SqliteStorage, Storage,
};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration for a single site
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 2,
            connect_timeout: 5,
            timeout: 5,
            fragment_retry_delay: 10, // Very short for testing
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        sites: vec![SiteEntry {
            base_url: base_url.to_string(),
        }],
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_html(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Registers the configured site, schedules an AUTO scan and drains the queue
async fn audit(config: &Config) -> (SharedStorage, ScanRecord, PoolSummary) {
    let mut storage = SqliteStorage::new_in_memory().expect("Failed to create storage");
    let site = register_site(&mut storage, &config.sites[0].base_url)
        .expect("Failed to register site");
    let scan = schedule_site_scan(&mut storage, &site, ScanType::Auto)
        .expect("Failed to schedule scan");

    let storage = Arc::new(Mutex::new(storage));
    let summary = run_queue(config, Arc::clone(&storage))
        .await
        .expect("Worker pool failed");

    (storage, scan, summary)
}

fn job_status_for(storage: &SharedStorage, scan_id: i64, uri: &str) -> JobStatus {
    let storage = lock(storage).unwrap();
    let page = storage
        .get_page_by_scan_and_uri(scan_id, uri)
        .unwrap()
        .unwrap_or_else(|| panic!("no page for {}", uri));
    storage.get_jobs_for_page(page.id).unwrap()[0].status
}

fn scan_status(storage: &SharedStorage, scan_id: i64) -> ScanStatus {
    lock(storage).unwrap().get_scan(scan_id).unwrap().unwrap().status
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        r#"<a href="/page1">Page 1</a> <a href="page2#intro">Page 2</a>"#,
    )
    .await;
    mount_html(
        &mock_server,
        "/page1",
        r#"<a href="/page2">Page 2 again</a> <a href="/">Home</a> <a href="https://elsewhere.org/">Out</a>"#,
    )
    .await;
    mount_html(&mock_server, "/page2", "No links here").await;

    let config = create_test_config(&base_url, ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    assert_eq!(summary.done, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pages_scheduled, 2);

    {
        let storage = lock(&storage).unwrap();
        assert_eq!(storage.count_pages_for_scan(scan.id).unwrap(), 3);
        assert_eq!(storage.count_jobs_by_status(JobStatus::Done).unwrap(), 3);
        assert!(storage
            .get_page_by_scan_and_uri(scan.id, &format!("{}/page2", base_url))
            .unwrap()
            .is_some());
    }

    let finished = lock(&storage).unwrap().get_scan(scan.id).unwrap().unwrap();
    assert_eq!(finished.status, ScanStatus::Complete);
    assert!(finished.end_time.is_some());
    assert!(finished.error.is_none());
}

#[tokio::test]
async fn test_non_html_page_is_skipped() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        r#"<a href="/data.json">Data</a> <a href="/about">About</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"links": ["<a href=\"/hidden\">x</a>"]}"#, "application/json"),
        )
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/about", "About us").await;

    let config = create_test_config(&base_url, ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    // nothing is extracted from the JSON body
    assert_eq!(summary.pages_scheduled, 2);
    assert_eq!(
        job_status_for(&storage, scan.id, &format!("{}/data.json", base_url)),
        JobStatus::Done
    );
    assert!(lock(&storage)
        .unwrap()
        .get_page_by_scan_and_uri(scan.id, &format!("{}/hidden", base_url))
        .unwrap()
        .is_none());
    assert_eq!(scan_status(&storage, scan.id), ScanStatus::Complete);
}

#[tokio::test]
async fn test_redirect_to_known_page_fails_child_only() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(
        &mock_server,
        "/",
        r#"<a href="/alias">Alias</a> <a href="/target">Target</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/alias"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/target", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/target", "Target page").await;

    let config = create_test_config(&base_url, ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(
        job_status_for(&storage, scan.id, &format!("{}/alias", base_url)),
        JobStatus::Failed
    );
    assert_eq!(
        job_status_for(&storage, scan.id, &format!("{}/target", base_url)),
        JobStatus::Done
    );
    // a failed child page does not fail the scan
    assert_eq!(scan_status(&storage, scan.id), ScanStatus::Complete);
}

#[tokio::test]
async fn test_redirect_to_new_uri_renames_page() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(&mock_server, "/", r#"<a href="/old">Old</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/new", base_url).as_str()),
        )
        .mount(&mock_server)
        .await;
    mount_html(&mock_server, "/new", "Moved here").await;

    let config = create_test_config(&base_url, ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    assert_eq!(summary.done, 2);
    let storage = lock(&storage).unwrap();
    assert!(storage
        .get_page_by_scan_and_uri(scan.id, &format!("{}/old", base_url))
        .unwrap()
        .is_none());
    assert!(storage
        .get_page_by_scan_and_uri(scan.id, &format!("{}/new", base_url))
        .unwrap()
        .is_some());
    assert_eq!(storage.count_pages_for_scan(scan.id).unwrap(), 2);
}

#[tokio::test]
async fn test_off_site_redirect_fails_page() {
    let mock_server = MockServer::start().await;
    let other_server = MockServer::start().await;
    let base_url = mock_server.uri();

    mount_html(&mock_server, "/", r#"<a href="/leave">Leave</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/leave"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/landing", other_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;
    mount_html(&other_server, "/landing", r#"<a href="/more">More</a>"#).await;

    let config = create_test_config(&base_url, ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(
        job_status_for(&storage, scan.id, &format!("{}/leave", base_url)),
        JobStatus::Failed
    );
    assert_eq!(
        lock(&storage).unwrap().count_pages_for_scan(scan.id).unwrap(),
        2
    );
    assert_eq!(scan_status(&storage, scan.id), ScanStatus::Complete);
}

#[tokio::test]
async fn test_unreachable_root_marks_scan_error() {
    // Nothing listens on the discard port
    let config = create_test_config("http://127.0.0.1:9/", ":memory:");
    let (storage, scan, summary) = audit(&config).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pages_scheduled, 0);

    let finished = lock(&storage).unwrap().get_scan(scan.id).unwrap().unwrap();
    assert_eq!(finished.status, ScanStatus::Error);
    assert!(finished.error.is_some());
}

#[tokio::test]
async fn test_statistics_after_crawl_with_file_database() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();
    mount_html(&mock_server, "/", r#"<a href="/a">A</a>"#).await;
    mount_html(&mock_server, "/a", "Leaf").await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("audit.db");
    let config = create_test_config(&base_url, db_path.to_str().unwrap());

    let mut storage = SqliteStorage::new(&db_path).unwrap();
    let site = register_site(&mut storage, &base_url).unwrap();
    let scan = schedule_site_scan(&mut storage, &site, ScanType::User).unwrap();
    let storage = Arc::new(Mutex::new(storage));

    let summary = run_queue(&config, Arc::clone(&storage)).await.unwrap();
    assert_eq!(summary.jobs_run(), 2);
    drop(storage);

    // reopen from disk
    let reopened = SqliteStorage::new(&db_path).unwrap();
    let stats = load_statistics(&reopened).unwrap();
    assert_eq!(stats.total_sites, 1);
    assert_eq!(stats.total_pages, 2);
    assert_eq!(stats.scans_with(ScanStatus::Complete), 1);
    assert_eq!(stats.jobs_with(JobStatus::Done), 2);
    assert_eq!(
        reopened.get_scan(scan.id).unwrap().unwrap().scan_type,
        ScanType::User
    );
}
