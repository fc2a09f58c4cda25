//! Statistics generation from the audit database
//!
//! This module provides functionality for extracting and displaying
//! scan and job statistics from the storage layer.

use crate::state::ScanStatus;
use crate::storage::{JobStatus, ScanRecord, Storage, StorageResult};
use std::collections::BTreeMap;

/// Audit statistics summary
#[derive(Debug, Clone, Default)]
pub struct ScanStatistics {
    /// Number of registered sites
    pub total_sites: u64,

    /// Number of pages across every scan
    pub total_pages: u64,

    /// Count of scans by status, zero counts omitted
    pub scans_by_status: BTreeMap<&'static str, u64>,

    /// Count of jobs by status, zero counts omitted
    pub jobs_by_status: BTreeMap<&'static str, u64>,

    /// Scans that ended in ERROR, with their recorded error
    pub failed_scans: Vec<ScanRecord>,
}

impl ScanStatistics {
    /// Number of scans with the given status
    pub fn scans_with(&self, status: ScanStatus) -> u64 {
        self.scans_by_status
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }

    /// Number of jobs with the given status
    pub fn jobs_with(&self, status: JobStatus) -> u64 {
        self.jobs_by_status
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }

    /// Total number of scans
    pub fn total_scans(&self) -> u64 {
        self.scans_by_status.values().sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ScanStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics<S: Storage + ?Sized>(storage: &S) -> StorageResult<ScanStatistics> {
    let total_sites = storage.list_sites()?.len() as u64;
    let total_pages = storage.count_total_pages()?;

    let mut scans_by_status = BTreeMap::new();
    for status in ScanStatus::all_states() {
        let count = storage.count_scans_by_status(status)?;
        if count > 0 {
            scans_by_status.insert(status.to_db_string(), count);
        }
    }

    let mut jobs_by_status = BTreeMap::new();
    for status in [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Superseded,
    ] {
        let count = storage.count_jobs_by_status(status)?;
        if count > 0 {
            jobs_by_status.insert(status.to_db_string(), count);
        }
    }

    let failed_scans = storage
        .list_scans()?
        .into_iter()
        .filter(|scan| scan.status == ScanStatus::Error)
        .collect();

    Ok(ScanStatistics {
        total_sites,
        total_pages,
        scans_by_status,
        jobs_by_status,
        failed_scans,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to print
pub fn print_statistics(stats: &ScanStatistics) {
    println!("=== Audit Statistics ===\n");

    println!("Overview:");
    println!("  Sites: {}", stats.total_sites);
    println!("  Scans: {}", stats.total_scans());
    println!("  Pages: {}", stats.total_pages);
    println!();

    println!("Scans by Status:");
    for (status, count) in &stats.scans_by_status {
        println!("  {}: {}", status, count);
    }
    println!();

    println!("Jobs by Status:");
    let total_jobs: u64 = stats.jobs_by_status.values().sum();
    for (status, count) in &stats.jobs_by_status {
        let percentage = if total_jobs > 0 {
            (*count as f64 / total_jobs as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.failed_scans.is_empty() {
        println!("Failed Scans ({}):", stats.failed_scans.len());
        for scan in &stats.failed_scans {
            println!(
                "  - scan {} (site {}): {}",
                scan.id,
                scan.sites_id,
                scan.error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    let finished = stats.scans_with(ScanStatus::Complete) + stats.scans_with(ScanStatus::Error);
    let completion_rate = if finished > 0 {
        (stats.scans_with(ScanStatus::Complete) as f64 / finished as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Completion Rate: {:.1}% ({} / {} finished scans complete)",
        completion_rate,
        stats.scans_with(ScanStatus::Complete),
        finished
    );
}
