//! Scan lifecycle module
//!
//! This module owns the domain operations on sites, scans and pages:
//! - Registering sites and starting scans for them
//! - The CREATED to QUEUED step of a scan, which schedules its root page
//! - Creating pages once per scan and scheduling their download jobs
//! - Replacing a scan when its site moves to https
//!
//! Every operation runs against a `Storage` borrowed mutably, so callers that
//! share a backend hold its lock for the duration of one operation.

mod lifecycle;
mod page;
mod site;

pub use lifecycle::{create_new_scan, delete_scan, replace_scan_after_upgrade, schedule_scan};
pub use page::{create_and_schedule_page, create_new_page, get_page_by_scan_and_uri, schedule_page};
pub use site::{has_active_scan, register_site, schedule_site_scan};
