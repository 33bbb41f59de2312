//! Newtype wrappers for type safety
//!
//! Session ids are what callers hold on to; process handles are opaque
//! indices into the controller's process table and never leave the process.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Newtype Wrappers for Type Safety
// ============================================================================

/// Session ID newtype for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session ID from an existing string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the session ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is safe to use as a file name component
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque index into a controller's process table
///
/// Handles are allocated monotonically and never reused, so a stale handle
/// can only ever miss, never alias another session's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    /// Wrap a raw table index
    #[must_use]
    pub const fn new(index: u64) -> Self {
        Self(index)
    }

    /// Raw table index
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_well_formed() {
        let id = SessionId::generate();
        assert!(id.is_well_formed());
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn path_like_ids_are_rejected() {
        assert!(!SessionId::new("../etc/passwd").is_well_formed());
        assert!(!SessionId::new("").is_well_formed());
        assert!(SessionId::new("a1b2c3d4e5f6").is_well_formed());
    }
}
