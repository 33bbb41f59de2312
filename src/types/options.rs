//! Controller and manager options
//!
//! This module contains the configuration for the process controller and the
//! session manager, each with a builder.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum length of a single stdout line (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default number of stderr lines kept for error reports
pub const DEFAULT_STDERR_TAIL_LINES: usize = 20;

/// Default grace period before a terminating process is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default cap on `send` output, in characters
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 4000;

// ============================================================================
// Controller Options
// ============================================================================

/// Options for launching Claude Code processes
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Explicit path to the CLI (searched for when `None`)
    pub cli_path: Option<PathBuf>,
    /// AI model to use
    pub model: Option<String>,
    /// Extra environment variables for the CLI process
    pub env: HashMap<String, String>,
    /// Maximum length of a single stdout line
    pub max_line_bytes: usize,
    /// Number of trailing stderr lines kept for error reports
    pub stderr_tail_lines: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            model: None,
            env: HashMap::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
        }
    }
}

impl ControllerOptions {
    /// Create a new builder for `ControllerOptions`
    #[must_use]
    pub fn builder() -> ControllerOptionsBuilder {
        ControllerOptionsBuilder::default()
    }
}

/// Builder for `ControllerOptions`
#[derive(Debug, Default)]
pub struct ControllerOptionsBuilder {
    options: ControllerOptions,
}

impl ControllerOptionsBuilder {
    /// Set CLI path
    #[must_use]
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    /// Set model
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Set maximum stdout line length
    ///
    /// # Panics
    /// Panics if `bytes` is zero
    #[must_use]
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "max_line_bytes must be positive");
        self.options.max_line_bytes = bytes;
        self
    }

    /// Set number of stderr lines kept for error reports
    #[must_use]
    pub const fn stderr_tail_lines(mut self, lines: usize) -> Self {
        self.options.stderr_tail_lines = lines;
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ControllerOptions {
        self.options
    }
}

// ============================================================================
// Manager Options
// ============================================================================

/// Options for the session manager
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// How long `exit` waits for an in-flight `send` and for graceful shutdown
    pub grace_period: Duration,
    /// Cap on `send` output, in characters
    pub max_output_chars: usize,
    /// Sessions idle longer than this are evicted by the reaper
    pub idle_timeout: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            idle_timeout: None,
        }
    }
}

impl ManagerOptions {
    /// Create a new builder for `ManagerOptions`
    #[must_use]
    pub fn builder() -> ManagerOptionsBuilder {
        ManagerOptionsBuilder::default()
    }
}

/// Builder for `ManagerOptions`
#[derive(Debug, Default)]
pub struct ManagerOptionsBuilder {
    options: ManagerOptions,
}

impl ManagerOptionsBuilder {
    /// Set grace period
    #[must_use]
    pub const fn grace_period(mut self, grace: Duration) -> Self {
        self.options.grace_period = grace;
        self
    }

    /// Set output cap
    #[must_use]
    pub const fn max_output_chars(mut self, chars: usize) -> Self {
        self.options.max_output_chars = chars;
        self
    }

    /// Set idle timeout
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.idle_timeout = Some(timeout);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ManagerOptions {
        self.options
    }
}
