//! Report format versioning

use serde::{Deserialize, Serialize};
use std::fmt;

/// Report format version using semantic versioning
///
/// Later tooling that consumes JSON reports checks this before reading
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Current report format version
pub const CURRENT_VERSION: ReportVersion = ReportVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

impl ReportVersion {
    /// Check if a reader at this version can consume a report at `other`
    pub fn is_compatible_with(&self, other: &ReportVersion) -> bool {
        self.major == other.major && self.minor >= other.minor
    }
}

impl fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
