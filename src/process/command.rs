//! CLI command building logic for Claude Code subprocesses

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::VERSION;
use crate::types::options::ControllerOptions;

use super::config::{CLAUDE_CLI_ARGS, DANGEROUS_ENV_VARS, ENTRYPOINT};

/// Command builder for Claude CLI
pub struct CommandBuilder<'a> {
    cli_path: &'a Path,
    working_directory: &'a Path,
    options: &'a ControllerOptions,
    resume: Option<&'a str>,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(
        cli_path: &'a Path,
        working_directory: &'a Path,
        options: &'a ControllerOptions,
    ) -> Self {
        Self {
            cli_path,
            working_directory,
            options,
            resume: None,
        }
    }

    /// Resume an earlier conversation instead of starting a new one
    #[must_use]
    pub fn resume(mut self, conversation_id: Option<&'a str>) -> Self {
        self.resume = conversation_id;
        self
    }

    /// Arguments passed to the CLI, in order
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = CLAUDE_CLI_ARGS.iter().map(|a| (*a).to_string()).collect();

        if let Some(ref model) = self.options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(conversation_id) = self.resume {
            args.push("--resume".to_string());
            args.push(conversation_id.to_string());
        }

        args
    }

    /// Build the complete CLI command with stdio piped and env filtered
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.cli_path);
        cmd.args(self.args());

        for (key, value) in &self.options.env {
            if DANGEROUS_ENV_VARS.contains(&key.as_str()) {
                log::warn!("Ignoring dangerous environment variable {key} for Claude Code");
            } else {
                cmd.env(key, value);
            }
        }

        cmd.env("CLAUDE_CODE_ENTRYPOINT", ENTRYPOINT)
            .env("CC_SESSION_VERSION", VERSION)
            .env("PWD", self.working_directory)
            .current_dir(self.working_directory);

        // stderr is piped rather than inherited so the child can never touch
        // the caller's terminal; a side task drains it.
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_args_are_non_interactive() {
        let options = ControllerOptions::default();
        let builder = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options);
        let args = builder.args();
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
        assert!(args.contains(&"--print".to_string()));
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn resume_and_model_are_appended() {
        let options = ControllerOptions::builder().model("opus").build();
        let args = CommandBuilder::new(Path::new("claude"), Path::new("/tmp"), &options)
            .resume(Some("conv-42"))
            .args();
        let tail: Vec<&str> = args.iter().rev().take(4).rev().map(String::as_str).collect();
        assert_eq!(tail, ["--model", "opus", "--resume", "conv-42"]);
    }
}
