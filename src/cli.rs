//! Command-line interface of the `cc` binary

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::manager::Request;
use crate::registry::FileStore;
use crate::types::identifiers::SessionId;
use crate::types::options::{
    ControllerOptions, DEFAULT_GRACE_PERIOD, DEFAULT_MAX_OUTPUT_CHARS, ManagerOptions,
};

/// Multi-turn session manager for the Claude Code CLI
#[derive(Parser, Debug)]
#[command(name = "cc", version)]
pub struct Cli {
    /// Shared configuration
    #[command(flatten)]
    pub config: Config,

    /// Verb to run
    #[command(subcommand)]
    pub command: Command,
}

/// Global flags, each also settable through the environment
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Directory holding session records (default ~/.nanobot/claude-sessions)
    #[arg(long, global = true, env = "CC_SESSIONS_DIR")]
    pub sessions_dir: Option<PathBuf>,

    /// Path to the claude binary (default: search PATH)
    #[arg(long, global = true, env = "CC_CLI_PATH")]
    pub cli_path: Option<PathBuf>,

    /// Model passed to claude
    #[arg(long, global = true, env = "CC_MODEL")]
    pub model: Option<String>,

    /// Truncate send output beyond this many characters
    #[arg(long, global = true, env = "CC_MAX_OUTPUT_CHARS", default_value_t = DEFAULT_MAX_OUTPUT_CHARS)]
    pub max_output_chars: usize,

    /// How long exit waits for a process before killing it
    #[arg(long, global = true, env = "CC_GRACE_PERIOD_MS", default_value_t = DEFAULT_GRACE_PERIOD.as_millis() as u64)]
    pub grace_period_ms: u64,

    /// Exit sessions idle this long (serve only)
    #[arg(long, global = true, env = "CC_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,
}

impl Config {
    /// Resolve the sessions directory
    ///
    /// # Errors
    /// Returns `InvalidArgument` if no directory was given and the home
    /// directory cannot be determined
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        self.sessions_dir
            .clone()
            .or_else(FileStore::default_dir)
            .ok_or_else(|| {
                SessionError::invalid_argument("cannot determine home directory, set CC_SESSIONS_DIR")
            })
    }

    /// Options for the process controller
    #[must_use]
    pub fn controller_options(&self) -> ControllerOptions {
        let mut builder = ControllerOptions::builder();
        if let Some(ref path) = self.cli_path {
            builder = builder.cli_path(path.clone());
        }
        if let Some(ref model) = self.model {
            builder = builder.model(model.clone());
        }
        builder.build()
    }

    /// Options for the session manager
    #[must_use]
    pub fn manager_options(&self) -> ManagerOptions {
        let mut builder = ManagerOptions::builder()
            .grace_period(Duration::from_millis(self.grace_period_ms))
            .max_output_chars(self.max_output_chars);
        if let Some(secs) = self.idle_timeout_secs.filter(|secs| *secs > 0) {
            builder = builder.idle_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

/// Verbs of the one-shot interface
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start a new session in a working directory
    Enter {
        /// Directory claude runs in
        working_directory: String,
    },
    /// Send a message to a session and print the response
    Send {
        /// Target session
        session_id: String,
        /// Message words, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        message: Vec<String>,
    },
    /// Report whether a session's process is alive
    Status {
        /// Target session
        session_id: String,
    },
    /// Tear a session down
    Exit {
        /// Target session
        session_id: String,
    },
    /// List live sessions
    List,
    /// Read JSON requests from stdin, one per line
    Serve,
}

impl Command {
    /// The request this command stands for; `None` for `serve`
    #[must_use]
    pub fn into_request(self) -> Option<Request> {
        Some(match self {
            Self::Enter { working_directory } => Request::Enter { working_directory },
            Self::Send {
                session_id,
                message,
            } => Request::Send {
                session_id: SessionId::from(session_id),
                message: message.join(" "),
            },
            Self::Status { session_id } => Request::Status {
                session_id: SessionId::from(session_id),
            },
            Self::Exit { session_id } => Request::Exit {
                session_id: SessionId::from(session_id),
            },
            Self::List => Request::List,
            Self::Serve => return None,
        })
    }
}
