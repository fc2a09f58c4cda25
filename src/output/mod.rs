//! Output module for reporting audit results
//!
//! Scan and job statistics are read back from storage and printed after the
//! worker pool drains, or on demand with `--stats`.

pub mod stats;

pub use stats::{load_statistics, print_statistics, ScanStatistics};
