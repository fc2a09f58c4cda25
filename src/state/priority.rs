use crate::state::ScanType;

/// Which part of a scan a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// The root page of a scan (the site's base URL)
    Site,
    /// A page discovered while crawling
    Page,
}

/// Job queue priority. Higher values are dispatched first.
///
/// Automatic audits outrank user requests so routine recurring scans are not
/// starved by bursts of user re-checks; within a scan type the root page
/// outranks discovered pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    UserPageScan = 100,
    UserSiteScan = 200,
    AutoPageScan = 300,
    AutoSiteScan = 400,
}

impl Priority {
    /// Picks the priority for a job of the given scan type and tier
    pub fn for_scan(scan_type: ScanType, tier: Tier) -> Self {
        match (scan_type, tier) {
            (ScanType::Auto, Tier::Site) => Self::AutoSiteScan,
            (ScanType::Auto, Tier::Page) => Self::AutoPageScan,
            (ScanType::User, Tier::Site) => Self::UserSiteScan,
            (ScanType::User, Tier::Page) => Self::UserPageScan,
        }
    }

    /// Numeric value stored with the job
    pub fn value(&self) -> u32 {
        *self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_values() {
        assert_eq!(Priority::AutoSiteScan.value(), 400);
        assert_eq!(Priority::AutoPageScan.value(), 300);
        assert_eq!(Priority::UserSiteScan.value(), 200);
        assert_eq!(Priority::UserPageScan.value(), 100);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::AutoSiteScan > Priority::AutoPageScan);
        assert!(Priority::AutoPageScan > Priority::UserSiteScan);
        assert!(Priority::UserSiteScan > Priority::UserPageScan);
    }

    #[test]
    fn test_for_scan() {
        assert_eq!(
            Priority::for_scan(ScanType::Auto, Tier::Site),
            Priority::AutoSiteScan
        );
        assert_eq!(
            Priority::for_scan(ScanType::Auto, Tier::Page),
            Priority::AutoPageScan
        );
        assert_eq!(
            Priority::for_scan(ScanType::User, Tier::Site),
            Priority::UserSiteScan
        );
        assert_eq!(
            Priority::for_scan(ScanType::User, Tier::Page),
            Priority::UserPageScan
        );
    }
}
