//! Session state structures
//!
//! Defines the registry record for a session and the summary/liveness types
//! reported back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::identifiers::{ProcessHandle, SessionId};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session owns (or can re-attach) a running process
    Active,
    /// Session was torn down; only its tombstone remains
    Exited,
}

/// Registry record for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier
    pub session_id: SessionId,

    /// Canonical working directory of the external process
    pub working_directory: PathBuf,

    /// Current lifecycle state
    pub state: SessionState,

    /// Handle into the controller's process table; `None` while detached
    #[serde(skip)]
    pub process: Option<ProcessHandle>,

    /// Conversation id reported by the CLI, used to resume after detaching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Last successful `send`
    pub last_activity_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a fresh active, detached record
    #[must_use]
    pub fn new(session_id: SessionId, working_directory: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            working_directory,
            state: SessionState::Active,
            process: None,
            conversation_id: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Whether a live process is currently attached
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.process.is_some()
    }
}

/// Result of a non-blocking liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Process is running
    Alive,
    /// Process has exited or was never found
    Dead,
}

impl Liveness {
    /// Status string used in records
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Dead => "dead",
        }
    }
}

/// Session info for `list` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Unique identifier for the session
    pub session_id: SessionId,

    /// Working directory of the session
    pub working_directory: PathBuf,

    /// TRUE if a process is attached in this manager
    pub attached: bool,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Last successful `send`
    pub last_activity_at: DateTime<Utc>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            working_directory: record.working_directory.clone(),
            attached: record.is_attached(),
            created_at: record.created_at,
            last_activity_at: record.last_activity_at,
        }
    }
}
