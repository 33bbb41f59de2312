//! Persistent Claude Code process controller

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::types::identifiers::ProcessHandle;
use crate::types::options::ControllerOptions;
use crate::types::session::Liveness;

use super::command::CommandBuilder;
use super::config::{HOME_CLI_LOCATIONS, SYSTEM_CLI_LOCATIONS};
use super::worker::{ProcessCommand, WorkerHandle, WorkerSpawn, spawn_worker};
use super::{Delivery, ProcessController};

/// Extra time allowed for a killed worker to report back
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Controller running one persistent `claude` stream-json process per handle
///
/// Processes live in a table indexed by [`ProcessHandle`]. Handles are never
/// reused, so a handle that outlives its process simply stops resolving.
pub struct ClaudeProcessController {
    options: ControllerOptions,
    table: Mutex<HashMap<ProcessHandle, WorkerHandle>>,
    next_index: AtomicU64,
}

impl ClaudeProcessController {
    /// Create a controller with the given options
    #[must_use]
    pub fn new(options: ControllerOptions) -> Self {
        Self {
            options,
            table: Mutex::new(HashMap::new()),
            next_index: AtomicU64::new(1),
        }
    }

    /// Number of processes currently in the table
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Find Claude Code CLI binary
    ///
    /// # Errors
    /// Returns error if CLI cannot be found in PATH or common locations
    pub fn find_cli() -> Result<PathBuf> {
        if let Ok(path) = which::which("claude") {
            return Ok(path);
        }

        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let candidates = home
            .iter()
            .flat_map(|home| HOME_CLI_LOCATIONS.iter().map(move |rel| home.join(rel)))
            .chain(SYSTEM_CLI_LOCATIONS.iter().map(PathBuf::from));

        for path in candidates {
            if path.is_file() {
                return Ok(path);
            }
        }

        Err(SessionError::cli_not_found())
    }

    fn cli_path(&self) -> Result<PathBuf> {
        match self.options.cli_path {
            Some(ref path) => Ok(path.clone()),
            None => Self::find_cli(),
        }
    }
}

impl Default for ClaudeProcessController {
    fn default() -> Self {
        Self::new(ControllerOptions::default())
    }
}

impl Drop for ClaudeProcessController {
    fn drop(&mut self) {
        for (_, worker) in self.table.get_mut().drain() {
            worker.kill.cancel();
        }
    }
}

impl ProcessController for ClaudeProcessController {
    async fn spawn(&self, working_directory: &Path, resume: Option<&str>) -> Result<ProcessHandle> {
        if !working_directory.is_dir() {
            return Err(SessionError::spawn(format!(
                "working directory is not an accessible directory: {}",
                working_directory.display()
            )));
        }

        let cli_path = self
            .cli_path()
            .map_err(|e| SessionError::spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&cli_path, working_directory, &self.options)
            .resume(resume)
            .build();

        let mut child = cmd.spawn().map_err(|e| {
            SessionError::spawn(format!("{}: {e}", cli_path.display()))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(SessionError::spawn("Failed to get stdio handles"));
        };

        let handle = ProcessHandle::new(self.next_index.fetch_add(1, Ordering::SeqCst));
        log::info!(
            "[{}] Started Claude Code (pid {:?}) in {}{}",
            handle,
            child.id(),
            working_directory.display(),
            resume.map(|id| format!(", resuming {id}")).unwrap_or_default()
        );

        let worker = spawn_worker(WorkerSpawn {
            handle,
            child,
            stdin,
            stdout,
            stderr,
            max_line_bytes: self.options.max_line_bytes,
            stderr_tail_lines: self.options.stderr_tail_lines,
        });
        self.table.lock().insert(handle, worker);

        Ok(handle)
    }

    async fn deliver(
        &self,
        handle: ProcessHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery> {
        let command_tx = {
            let table = self.table.lock();
            let worker = table.get(&handle).ok_or_else(|| {
                SessionError::delivery(handle.to_string(), "process is no longer running", None)
            })?;
            worker.command_tx.clone()
        };

        let (response_tx, response_rx) = oneshot::channel();
        command_tx
            .send(ProcessCommand::Deliver {
                text: text.to_string(),
                response_tx,
            })
            .map_err(|_| {
                SessionError::delivery(handle.to_string(), "process is no longer running", None)
            })?;

        tokio::select! {
            r = response_rx => r.unwrap_or_else(|_| {
                Err(SessionError::delivery(handle.to_string(), "process worker stopped", None))
            }),
            () = cancel.cancelled() => Err(SessionError::Cancelled(handle.to_string())),
        }
    }

    async fn terminate(&self, handle: ProcessHandle, grace: Duration) -> Result<()> {
        let worker = self.table.lock().remove(&handle);
        let Some(worker) = worker else {
            return Ok(());
        };

        let (response_tx, response_rx) = oneshot::channel();
        let queued = worker
            .command_tx
            .send(ProcessCommand::Shutdown { grace, response_tx })
            .is_ok();

        let result = if queued {
            // The worker may still be busy with an in-flight delivery, so give
            // it the grace period to get to the shutdown request.
            match tokio::time::timeout(grace * 2, response_rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Ok(()),
                Err(_) => {
                    log::warn!("[{handle}] Graceful shutdown timed out, killing");
                    Ok(())
                }
            }
        } else {
            Ok(())
        };

        worker.kill.cancel();
        if tokio::time::timeout(KILL_SETTLE, worker.task).await.is_err() {
            log::warn!("[{handle}] Worker did not settle after kill");
        }
        log::info!("[{handle}] Terminated Claude Code");
        result
    }

    fn probe(&self, handle: ProcessHandle) -> Result<Liveness> {
        let table = self.table.lock();
        Ok(match table.get(&handle) {
            Some(worker) if worker.alive.load(Ordering::SeqCst) => Liveness::Alive,
            _ => Liveness::Dead,
        })
    }
}
