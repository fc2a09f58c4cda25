//! State module for tracking scan progress
//!
//! This module provides the enumerations that drive a scan's lifecycle and the
//! dispatch order of its page jobs.
//!
//! # Components
//!
//! - `ScanStatus`: Forward-only lifecycle of a scan (created, queued, running, complete, error)
//! - `ScanType`: Whether a scan was requested by a user or by the automatic scheduler
//! - `Priority`: The four fixed job queue priorities

mod priority;
mod scan_status;

// Re-export main types
pub use priority::{Priority, Tier};
pub use scan_status::{ScanStatus, ScanType};
