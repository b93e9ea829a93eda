//! Rotation severity.

use std::fmt;

/// How disruptive an update of a member is. Ordered by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RotationMode {
    /// Nothing to do.
    #[default]
    Skipped,
    /// Only the recorded template changes; the pod stays untouched.
    Silent,
    /// The running pod is patched in place.
    InPlace,
    /// The pod is shut down cleanly and recreated.
    Graceful,
    /// The pod is recreated immediately.
    Enforced,
}

impl RotationMode {
    /// Combine two modes; the more disruptive one wins.
    pub fn and(self, other: RotationMode) -> RotationMode {
        self.max(other)
    }

    pub fn is_skipped(self) -> bool {
        self == RotationMode::Skipped
    }
}

impl fmt::Display for RotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
