//! # Claude Code session manager
//!
//! Drives multi-turn conversations with the Claude Code CLI. Each session
//! owns one long-running `claude` process that keeps its context between
//! messages, so a calling agent can hand a whole conversation over to
//! Claude Code and take it back later.
//!
//! ## Quick Start
//!
//! ```no_run
//! use claude_code_session::{
//!     ClaudeProcessController, ManagerOptions, Request, SessionManager, SessionRegistry,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let manager = SessionManager::new(
//!     SessionRegistry::in_memory(),
//!     ClaudeProcessController::default(),
//!     ManagerOptions::default(),
//! );
//! let cancel = CancellationToken::new();
//!
//! let entered = manager
//!     .dispatch(Request::parse(&["enter", "/path/to/project"]).unwrap(), &cancel)
//!     .await;
//! println!("{}", entered.to_json());
//! # }
//! ```
//!
//! ## Verbs
//!
//! - `enter <dir>` starts a session and returns its id
//! - `send <id> <message>` forwards a message and waits, without timeout,
//!   for the full response
//! - `status <id>` reports whether the process is alive
//! - `exit <id>` terminates the process; the id is never reused
//! - `list` summarizes live sessions
//!
//! Every verb answers with one JSON [`Record`].
//!
//! ## Architecture
//!
//! - [`registry`]: session records over a pluggable [`SessionStore`]
//! - [`process`]: the [`ProcessController`] seam and its `claude` implementation
//! - [`manager`]: the verb state machine
//! - [`record`]: result serialization
//! - [`serve`]: the long-lived request loop
//! - [`message`]: stream-json message parsing
//! - [`error`]: error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod manager;
pub mod message;
pub mod process;
pub mod record;
pub mod registry;
pub mod serve;
pub mod types;

pub use error::{Result, SessionError};
pub use manager::{Outcome, Request, SessionManager};
pub use process::{ClaudeProcessController, Delivery, ProcessController};
pub use record::{ErrorRecord, Record};
pub use registry::{FileStore, MemoryStore, SessionRegistry, SessionStore};
pub use types::identifiers::{ProcessHandle, SessionId};
pub use types::options::{ControllerOptions, ManagerOptions};
pub use types::session::{Liveness, SessionRecord, SessionState, SessionSummary};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
