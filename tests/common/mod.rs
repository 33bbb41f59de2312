//! Shared fixtures for integration tests
//!
//! `FakeController` stands in for the real `claude` process. It answers every
//! message with `echo: <text>` and understands a few command words:
//!
//! - `crash` kills the process mid-delivery
//! - `slow:<ms> <text>` waits before answering
//! - `big:<n>` answers with `n` characters
//! - `error-turn` answers with a turn flagged as failed

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use claude_code_session::{
    Delivery, Liveness, ManagerOptions, ProcessController, ProcessHandle, SessionError,
    SessionManager, SessionRegistry,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FakeProcess {
    alive: bool,
    conversation_id: String,
    in_flight: usize,
    kill: CancellationToken,
}

#[derive(Default)]
struct FakeState {
    processes: HashMap<ProcessHandle, FakeProcess>,
    spawns: Vec<(PathBuf, Option<String>)>,
    terminated: Vec<ProcessHandle>,
    max_in_flight: usize,
}

#[derive(Default)]
pub struct FakeController {
    state: Mutex<FakeState>,
    next_index: AtomicU64,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every spawn so far: working directory and resumed conversation
    pub fn spawns(&self) -> Vec<(PathBuf, Option<String>)> {
        self.state.lock().spawns.clone()
    }

    pub fn terminated(&self) -> Vec<ProcessHandle> {
        self.state.lock().terminated.clone()
    }

    /// Number of processes still in the table
    pub fn running(&self) -> usize {
        self.state.lock().processes.len()
    }

    /// Highest number of concurrent deliveries seen on any one process
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Make the process die as if it crashed on its own
    pub fn crash(&self, handle: ProcessHandle) {
        if let Some(process) = self.state.lock().processes.get_mut(&handle) {
            process.alive = false;
            process.kill.cancel();
        }
    }

    fn finish(&self, handle: ProcessHandle) {
        if let Some(process) = self.state.lock().processes.get_mut(&handle) {
            process.in_flight -= 1;
        }
    }
}

fn dead(handle: ProcessHandle) -> SessionError {
    SessionError::delivery(handle.to_string(), "process is no longer running", None)
}

impl ProcessController for FakeController {
    async fn spawn(&self, working_directory: &Path, resume: Option<&str>) -> claude_code_session::Result<ProcessHandle> {
        if !working_directory.is_dir() {
            return Err(SessionError::spawn("not a directory"));
        }
        let handle = ProcessHandle::new(self.next_index.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.state.lock();
        state
            .spawns
            .push((working_directory.to_path_buf(), resume.map(str::to_string)));
        state.processes.insert(
            handle,
            FakeProcess {
                alive: true,
                conversation_id: resume.map_or_else(|| format!("conv-{}", handle.index()), str::to_string),
                in_flight: 0,
                kill: CancellationToken::new(),
            },
        );
        Ok(handle)
    }

    async fn deliver(
        &self,
        handle: ProcessHandle,
        text: &str,
        cancel: &CancellationToken,
    ) -> claude_code_session::Result<Delivery> {
        let (kill, conversation_id) = {
            let mut state = self.state.lock();
            let process = match state.processes.get_mut(&handle) {
                Some(process) if process.alive => process,
                _ => return Err(dead(handle)),
            };
            process.in_flight += 1;
            let in_flight = process.in_flight;
            let found = (process.kill.clone(), process.conversation_id.clone());
            state.max_in_flight = state.max_in_flight.max(in_flight);
            found
        };

        let mut text = text.to_string();
        if let Some(rest) = text.strip_prefix("slow:") {
            let (ms, body) = rest.split_once(' ').unwrap_or((rest, ""));
            let ms: u64 = ms.parse().unwrap_or(0);
            let body = body.to_string();
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(ms)) => {}
                () = kill.cancelled() => {
                    self.finish(handle);
                    return Err(dead(handle));
                }
                () = cancel.cancelled() => {
                    self.finish(handle);
                    return Err(SessionError::Cancelled(handle.to_string()));
                }
            }
            text = body;
        } else {
            tokio::task::yield_now().await;
        }
        self.finish(handle);

        if text == "crash" {
            self.crash(handle);
            return Err(SessionError::delivery(
                handle.to_string(),
                "process exited before completing the response",
                Some("fatal: crashed".to_string()),
            ));
        }

        let (output, is_error) = if let Some(n) = text.strip_prefix("big:") {
            ("x".repeat(n.parse().unwrap_or(0)), false)
        } else if text == "error-turn" {
            ("tool failed".to_string(), true)
        } else {
            (format!("echo: {text}"), false)
        };

        Ok(Delivery {
            output,
            conversation_id: Some(conversation_id),
            is_error,
        })
    }

    async fn terminate(&self, handle: ProcessHandle, _grace: Duration) -> claude_code_session::Result<()> {
        let mut state = self.state.lock();
        if let Some(process) = state.processes.remove(&handle) {
            process.kill.cancel();
            state.terminated.push(handle);
        }
        Ok(())
    }

    fn probe(&self, handle: ProcessHandle) -> claude_code_session::Result<Liveness> {
        Ok(match self.state.lock().processes.get(&handle) {
            Some(process) if process.alive => Liveness::Alive,
            _ => Liveness::Dead,
        })
    }
}

pub fn manager_with(
    registry: SessionRegistry,
    options: ManagerOptions,
) -> SessionManager<FakeController> {
    SessionManager::new(registry, FakeController::new(), options)
}

pub fn manager() -> SessionManager<FakeController> {
    manager_with(SessionRegistry::in_memory(), ManagerOptions::default())
}
