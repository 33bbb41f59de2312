//! Verb protocol for the session manager
//!
//! A [`Request`] is one validated verb with its arguments; an [`Outcome`] is
//! what the manager hands back before it is rendered as a record.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SessionError};
use crate::types::identifiers::SessionId;
use crate::types::session::{Liveness, SessionSummary};

/// One verb with its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Request {
    /// Start a new session in a working directory
    Enter {
        /// Directory the external process runs in
        working_directory: String,
    },
    /// Forward a message to a session's process
    Send {
        /// Target session
        session_id: SessionId,
        /// Message text
        message: String,
    },
    /// Report whether a session's process is alive
    Status {
        /// Target session
        session_id: SessionId,
    },
    /// Tear a session down
    Exit {
        /// Target session
        session_id: SessionId,
    },
    /// Summarize every live session
    List,
}

impl Request {
    /// Parse the `<verb> [session_id] [argument]` shape
    ///
    /// Everything after the session id of `send` is joined with single
    /// spaces into the message.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for unknown verbs or missing arguments
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut args = args.iter().map(AsRef::as_ref);
        let verb = args
            .next()
            .ok_or_else(|| SessionError::invalid_argument("missing verb"))?;

        let request = match verb {
            "enter" => Self::Enter {
                working_directory: args
                    .next()
                    .ok_or_else(|| SessionError::invalid_argument("enter requires a working directory"))?
                    .to_string(),
            },
            "send" => {
                let session_id = next_session_id(&mut args, "send")?;
                let message = args.collect::<Vec<_>>().join(" ");
                Self::Send {
                    session_id,
                    message,
                }
            }
            "status" => Self::Status {
                session_id: next_session_id(&mut args, "status")?,
            },
            "exit" => Self::Exit {
                session_id: next_session_id(&mut args, "exit")?,
            },
            "list" => Self::List,
            other => {
                return Err(SessionError::invalid_argument(format!("unknown verb: {other}")));
            }
        };
        request.validate()?;
        Ok(request)
    }

    /// Check argument-level preconditions
    ///
    /// # Errors
    /// Returns `InvalidArgument` for empty paths, ids or messages
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Enter { working_directory } if working_directory.trim().is_empty() => {
                Err(SessionError::invalid_argument("working directory is empty"))
            }
            Self::Send { message, .. } if message.trim().is_empty() => {
                Err(SessionError::invalid_argument("message is empty"))
            }
            Self::Send { session_id, .. }
            | Self::Status { session_id }
            | Self::Exit { session_id }
                if session_id.as_str().is_empty() =>
            {
                Err(SessionError::invalid_argument("session id is empty"))
            }
            _ => Ok(()),
        }
    }

    /// Session the request targets, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Send { session_id, .. } | Self::Status { session_id } | Self::Exit { session_id } => {
                Some(session_id)
            }
            Self::Enter { .. } | Self::List => None,
        }
    }
}

fn next_session_id<'a>(args: &mut impl Iterator<Item = &'a str>, verb: &str) -> Result<SessionId> {
    args.next()
        .map(SessionId::from)
        .ok_or_else(|| SessionError::invalid_argument(format!("{verb} requires a session id")))
}

/// Successful result of a verb
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A new session was created
    Entered {
        /// Newly assigned id
        session_id: SessionId,
        /// Canonical working directory
        working_directory: PathBuf,
    },
    /// A message was answered
    Sent {
        /// Target session
        session_id: SessionId,
        /// Response text, already truncated
        output: String,
    },
    /// Liveness of a session's process
    Status {
        /// Target session
        session_id: SessionId,
        /// Working directory of the session
        working_directory: PathBuf,
        /// Probe result
        liveness: Liveness,
    },
    /// The session was torn down
    Exited {
        /// Target session
        session_id: SessionId,
    },
    /// Every live session
    Listed {
        /// Session summaries, oldest first
        sessions: Vec<SessionSummary>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_verbs() {
        assert_eq!(
            Request::parse(&["enter", "/work/app"]).unwrap(),
            Request::Enter {
                working_directory: "/work/app".into()
            }
        );
        assert_eq!(
            Request::parse(&["send", "s1", "list", "files"]).unwrap(),
            Request::Send {
                session_id: "s1".into(),
                message: "list files".into()
            }
        );
        assert_eq!(
            Request::parse(&["status", "s1"]).unwrap(),
            Request::Status {
                session_id: "s1".into()
            }
        );
        assert_eq!(
            Request::parse(&["exit", "s1"]).unwrap(),
            Request::Exit {
                session_id: "s1".into()
            }
        );
        assert_eq!(Request::parse(&["list"]).unwrap(), Request::List);
    }

    #[test]
    fn rejects_bad_arguments() {
        let empty: [&str; 0] = [];
        assert!(Request::parse(&empty).is_err());
        assert!(Request::parse(&["launch", "x"]).is_err());
        assert!(Request::parse(&["enter"]).is_err());
        assert!(Request::parse(&["send", "s1"]).is_err());
        assert!(Request::parse(&["send", "s1", "   "]).is_err());
        assert!(Request::parse(&["status"]).is_err());
    }

    #[test]
    fn deserializes_tagged_json() {
        let req: Request =
            serde_json::from_str(r#"{"verb":"send","session_id":"s1","message":"hi"}"#).unwrap();
        assert_eq!(req.session_id(), Some(&SessionId::new("s1")));
    }
}
