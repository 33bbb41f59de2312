//! Type definitions for the session manager
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `ProcessHandle`)
//! - [`session`] - Session records, states and summaries
//! - [`messages`] - Claude Code stream-json message types
//! - [`options`] - Controller and manager configuration

pub mod identifiers;
pub mod messages;
pub mod options;
pub mod session;

// Re-export commonly used types
pub use identifiers::{ProcessHandle, SessionId};
pub use messages::{ContentBlock, Message};
pub use options::{ControllerOptions, ManagerOptions};
pub use session::{Liveness, SessionRecord, SessionState, SessionSummary};
