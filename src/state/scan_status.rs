/// Scan lifecycle definitions
///
/// A scan only ever moves forward through its states; no state is revisited.
use std::fmt;

/// Represents the current state of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStatus {
    // ===== Active States =====
    /// Scan row exists but its root page has not been scheduled
    Created,

    /// Root page job is in the queue
    Queued,

    /// At least one page job of the scan has started
    Running,

    // ===== Terminal States =====
    /// Every page job of the scan has finished
    Complete,

    /// The scan could not be carried out
    Error,
}

impl ScanStatus {
    /// Position in the lifecycle, used to enforce forward-only transitions
    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Complete | Self::Error => 3,
        }
    }

    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns true if moving from `self` to `next` is a forward transition
    ///
    /// Terminal states accept nothing; skipping intermediate states is allowed
    /// (a scan may fail before it ever started running).
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "COMPLETE" => Some(Self::Complete),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all possible scan states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Created,
            Self::Queued,
            Self::Running,
            Self::Complete,
            Self::Error,
        ]
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Who asked for a scan. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanType {
    /// Requested by a person
    User,

    /// Requested by the recurring audit scheduler
    #[default]
    Auto,
}

impl ScanType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Auto => "AUTO",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
