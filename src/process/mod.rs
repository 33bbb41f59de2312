//! Process control for Claude Code sessions
//!
//! [`ProcessController`] is the seam between the dispatcher and the external
//! process. [`ClaudeProcessController`] keeps one persistent `claude`
//! stream-json process per session; tests substitute their own controllers.

mod command;
mod config;
mod controller;
mod worker;

pub use command::CommandBuilder;
pub use config::{CLAUDE_CLI_ARGS, DANGEROUS_ENV_VARS};
pub use controller::ClaudeProcessController;

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::identifiers::ProcessHandle;
use crate::types::session::Liveness;

/// Outcome of one delivered turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Final response text of the turn
    pub output: String,
    /// Conversation id reported by the process, for later resumption
    pub conversation_id: Option<String>,
    /// Whether the process flagged the turn itself as failed
    pub is_error: bool,
}

/// Owns the lifecycle of external processes, one per session
pub trait ProcessController: Send + Sync + 'static {
    /// Start a process in `working_directory`, resuming `resume` if given
    ///
    /// # Errors
    /// Returns `SpawnError` if the binary is missing or the directory is unusable
    fn spawn(
        &self,
        working_directory: &Path,
        resume: Option<&str>,
    ) -> impl Future<Output = Result<ProcessHandle>> + Send;

    /// Send `text` and wait, without timeout, for the complete response
    ///
    /// Cancelling `cancel` stops the wait without killing the process.
    ///
    /// # Errors
    /// Returns `DeliveryError` if the process died or emitted unusable output,
    /// `Cancelled` if the caller stopped waiting
    fn deliver(
        &self,
        handle: ProcessHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Delivery>> + Send;

    /// Shut the process down, killing it if it outlives `grace`
    ///
    /// Unknown handles are a no-op.
    ///
    /// # Errors
    /// Returns error if waiting on the process fails
    fn terminate(
        &self,
        handle: ProcessHandle,
        grace: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Non-blocking liveness check
    ///
    /// # Errors
    /// Returns error if liveness could not be determined
    fn probe(&self, handle: ProcessHandle) -> Result<Liveness>;
}
