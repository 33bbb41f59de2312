//! Structured result records
//!
//! Every verb answers with exactly one [`Record`], serialized as a single
//! JSON object. Fields that do not apply to a verb are omitted.

use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use crate::error::SessionError;
use crate::manager::Outcome;
use crate::types::identifiers::SessionId;
use crate::types::session::SessionSummary;

/// Message returned by `exit`
pub const EXITED_MESSAGE: &str = "Exited Claude Code mode, back to normal conversation.";

/// Status string of an exited session
pub const EXITED_STATUS: &str = "exited";

/// Message returned by `enter`
#[must_use]
pub fn entered_message(working_directory: &Path) -> String {
    format!(
        "Entered Claude Code mode\n\
         Working directory: {}\n\
         \n\
         Messages are now passed straight to Claude Code.\n\
         Send \"exit\" to leave this mode.",
        working_directory.display()
    )
}

/// Error details carried by a failed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Stable kind, see [`SessionError::kind`]
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Trailing stderr of the process, for delivery errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// One serialized verb result
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record {
    /// Echo of the caller's request id (serve mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,

    /// Session the record concerns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Canonical working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// Human-readable confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Response text of a `send`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// `alive`, `dead` or `exited`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Live sessions, for `list`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<SessionSummary>>,

    /// Failure details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl Record {
    /// Render a successful outcome
    #[must_use]
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Entered {
                session_id,
                working_directory,
            } => Self {
                session_id: Some(session_id.to_string()),
                message: Some(entered_message(&working_directory)),
                working_directory: Some(working_directory.display().to_string()),
                ..Self::default()
            },
            Outcome::Sent { session_id, output } => Self {
                session_id: Some(session_id.to_string()),
                output: Some(output),
                ..Self::default()
            },
            Outcome::Status {
                session_id,
                working_directory,
                liveness,
            } => Self {
                session_id: Some(session_id.to_string()),
                working_directory: Some(working_directory.display().to_string()),
                status: Some(liveness.as_str().to_string()),
                ..Self::default()
            },
            Outcome::Exited { session_id } => Self {
                session_id: Some(session_id.to_string()),
                status: Some(EXITED_STATUS.to_string()),
                message: Some(EXITED_MESSAGE.to_string()),
                ..Self::default()
            },
            Outcome::Listed { sessions } => Self {
                sessions: Some(sessions),
                ..Self::default()
            },
        }
    }

    /// Render a failure, tagged with the session it concerned if known
    #[must_use]
    pub fn from_error(session_id: Option<&SessionId>, err: &SessionError) -> Self {
        let stderr = match err {
            SessionError::DeliveryError { stderr, .. } => stderr.clone(),
            _ => None,
        };
        Self {
            session_id: session_id.map(ToString::to_string),
            error: Some(ErrorRecord {
                kind: err.kind().to_string(),
                message: err.to_string(),
                stderr,
            }),
            ..Self::default()
        }
    }

    /// Attach the caller's request id
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<Value>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Whether this record reports a failure
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Single-line JSON rendering
    ///
    /// Falls back to a hand-built internal error record if serialization
    /// itself fails, so callers always get one line.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "error": { "kind": "internal", "message": e.to_string() }
            })
            .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::session::Liveness;
    use std::path::PathBuf;

    #[test]
    fn sent_record_omits_unrelated_fields() {
        let record = Record::from_outcome(Outcome::Sent {
            session_id: SessionId::new("s1"),
            output: "done".into(),
        });
        assert_eq!(record.to_json(), r#"{"session_id":"s1","output":"done"}"#);
    }

    #[test]
    fn output_is_escaped_and_stays_on_one_line() {
        let record = Record::from_outcome(Outcome::Sent {
            session_id: SessionId::new("s1"),
            output: "line \"one\"\n\ttab\u{1}héllo".into(),
        });
        let json = record.to_json();
        assert!(!json.contains('\n'));
        assert!(json.contains(r#"line \"one\"\n\ttab\u0001héllo"#));

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back["output"], "line \"one\"\n\ttab\u{1}héllo");
    }

    #[test]
    fn status_and_exit_records() {
        let status = Record::from_outcome(Outcome::Status {
            session_id: SessionId::new("s1"),
            working_directory: PathBuf::from("/work"),
            liveness: Liveness::Dead,
        });
        assert_eq!(status.status.as_deref(), Some("dead"));
        assert_eq!(status.working_directory.as_deref(), Some("/work"));

        let exit = Record::from_outcome(Outcome::Exited {
            session_id: SessionId::new("s1"),
        });
        assert_eq!(exit.status.as_deref(), Some("exited"));
        assert_eq!(exit.message.as_deref(), Some(EXITED_MESSAGE));
    }

    #[test]
    fn error_record_carries_kind_and_stderr() {
        let err = SessionError::delivery("s1", "pipe closed", Some("boom".into()));
        let record = Record::from_error(Some(&SessionId::new("s1")), &err);
        assert!(record.is_error());

        let json: Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(json["error"]["kind"], "delivery_error");
        assert_eq!(json["error"]["stderr"], "boom");
        assert_eq!(json["session_id"], "s1");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn request_id_is_echoed() {
        let record = Record::from_error(None, &SessionError::invalid_argument("bad"))
            .with_request_id(Some(Value::from(7)));
        let json: Value = serde_json::from_str(&record.to_json()).unwrap();
        assert_eq!(json["request_id"], 7);
        assert_eq!(json["error"]["kind"], "invalid_argument");
    }
}
