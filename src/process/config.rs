//! Configuration constants for Claude Code subprocesses

/// Base CLI arguments for a persistent, non-interactive stream-json session
///
/// `--print` with stream-json input keeps one process alive across turns;
/// permissions are skipped because nobody is there to answer prompts.
pub const CLAUDE_CLI_ARGS: &[&str] = &[
    "--print",
    "--verbose", // required by the CLI for stream-json output
    "--input-format",
    "stream-json",
    "--output-format",
    "stream-json",
    "--dangerously-skip-permissions",
];

/// Dangerous environment variables that should not be passed to subprocess
///
/// These variables can affect how the subprocess loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Value of `CLAUDE_CODE_ENTRYPOINT` for processes we launch
pub const ENTRYPOINT: &str = "cc-session";

/// Locations searched for the CLI when it is not on `PATH`, relative to `$HOME`
pub const HOME_CLI_LOCATIONS: &[&str] = &[
    ".npm-global/bin/claude",
    ".local/bin/claude",
    "node_modules/.bin/claude",
    ".yarn/bin/claude",
    ".claude/local/claude",
];

/// Absolute locations searched for the CLI
pub const SYSTEM_CLI_LOCATIONS: &[&str] = &["/usr/local/bin/claude", "/opt/homebrew/bin/claude"];
