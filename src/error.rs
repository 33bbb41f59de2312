//! Error types for the Claude Code session manager

use thiserror::Error;

/// Main error type for session management
#[derive(Error, Debug)]
pub enum SessionError {
    /// Referenced session id is unknown or already purged
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// External process could not be started
    #[error("Failed to start Claude Code: {0}")]
    SpawnError(String),

    /// External process died or produced unusable output mid-session
    #[error("Delivery failed for session {session_id}: {message}")]
    DeliveryError {
        /// Session the delivery was issued for
        session_id: String,
        /// Error message
        message: String,
        /// Trailing stderr lines captured from the process
        stderr: Option<String>,
    },

    /// Operation attempted on a session that was already torn down
    #[error("Session {0} has already exited")]
    AlreadyExited(String),

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Claude Code CLI not found or not installed
    #[error("Claude Code CLI not found: {0}")]
    CliNotFound(String),

    /// Caller stopped waiting for a delivery
    #[error("Delivery cancelled for session {0}")]
    Cancelled(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create a CLI not found error
    #[must_use]
    pub fn cli_not_found() -> Self {
        Self::CliNotFound(
            "Claude Code not found. Install with:\n\
             npm install -g @anthropic-ai/claude-code\n\
             \n\
             Or point CC_CLI_PATH at the binary"
                .to_string(),
        )
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound(session_id.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::SpawnError(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(
        session_id: impl Into<String>,
        msg: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::DeliveryError {
            session_id: session_id.into(),
            message: msg.into(),
            stderr,
        }
    }

    /// Create an already exited error
    pub fn already_exited(session_id: impl Into<String>) -> Self {
        Self::AlreadyExited(session_id.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Stable machine-readable kind, used in serialized error records
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            // A missing binary is a spawn failure from the caller's point of view
            Self::SpawnError(_) | Self::CliNotFound(_) => "spawn_error",
            Self::DeliveryError { .. } | Self::Cancelled(_) => "delivery_error",
            Self::AlreadyExited(_) => "already_exited",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Io(_) | Self::Json(_) => "internal",
        }
    }

    /// Whether this error forces the owning session into the EXITED state
    #[must_use]
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::DeliveryError { .. })
    }

    /// Re-tag a delivery error with the caller-facing session id
    #[must_use]
    pub fn for_session(self, session_id: &str) -> Self {
        match self {
            Self::DeliveryError { message, stderr, .. } => Self::DeliveryError {
                session_id: session_id.to_string(),
                message,
                stderr,
            },
            Self::Cancelled(_) => Self::Cancelled(session_id.to_string()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(SessionError::session_not_found("x").kind(), "session_not_found");
        assert_eq!(SessionError::cli_not_found().kind(), "spawn_error");
        assert_eq!(SessionError::already_exited("x").kind(), "already_exited");
        assert_eq!(
            SessionError::delivery("x", "boom", None).kind(),
            "delivery_error"
        );
    }

    #[test]
    fn delivery_error_is_retagged() {
        let err = SessionError::delivery("proc-3", "pipe closed", None).for_session("abc");
        match err {
            SessionError::DeliveryError { session_id, .. } => assert_eq!(session_id, "abc"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(SessionError::delivery("a", "b", None).is_fatal_to_session());
        assert!(!SessionError::Cancelled("a".into()).is_fatal_to_session());
    }
}
