//! Session manager: the verb state machine
//!
//! [`SessionManager`] owns the registry and the process controller and is
//! the only code that moves a session between states:
//!
//! - `enter` spawns a process and registers an active, attached session
//! - `send` forwards one message and waits for the full response
//! - `status` probes the process without blocking
//! - `exit` terminates the process and tombstones the id
//!
//! A delivery failure or a dead probe force-exits the session, since the
//! process can no longer be trusted to hold the conversation.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::process::ProcessController;
use crate::record::Record;
use crate::registry::SessionRegistry;
use crate::types::identifiers::{ProcessHandle, SessionId};
use crate::types::options::ManagerOptions;
use crate::types::session::{Liveness, SessionSummary};

use super::commands::{Outcome, Request};
use super::helpers::{format_output, truncate_output};

type SessionLock = Arc<tokio::sync::Mutex<()>>;

/// Manager for Claude Code sessions
///
/// Operations on different sessions run fully in parallel. Operations on
/// one session are serialized by a per-session async lock, so at most one
/// `send` is ever in flight per process.
pub struct SessionManager<C: ProcessController> {
    registry: SessionRegistry,
    controller: C,
    options: ManagerOptions,
    locks: Mutex<HashMap<SessionId, SessionLock>>,
}

impl<C: ProcessController> SessionManager<C> {
    /// Create a manager over `registry`, driving processes through `controller`
    pub fn new(registry: SessionRegistry, controller: C, options: ManagerOptions) -> Self {
        Self {
            registry,
            controller,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The underlying process controller
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Manager configuration
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Run one request and render its record
    ///
    /// Never fails: every error becomes an error record.
    pub async fn dispatch(&self, request: Request, cancel: &CancellationToken) -> Record {
        let session_id = request.session_id().cloned();
        let result = match request.validate() {
            Ok(()) => self.run(request, cancel).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => Record::from_outcome(outcome),
            Err(e) => {
                log::debug!(
                    "Request for {} failed: {e}",
                    session_id.as_ref().map_or("-", SessionId::as_str)
                );
                Record::from_error(session_id.as_ref(), &e)
            }
        }
    }

    async fn run(&self, request: Request, cancel: &CancellationToken) -> Result<Outcome> {
        match request {
            Request::Enter { working_directory } => self.enter(&working_directory).await,
            Request::Send {
                session_id,
                message,
            } => self.send(&session_id, &message, cancel).await,
            Request::Status { session_id } => self.status(&session_id).await,
            Request::Exit { session_id } => self.exit(&session_id).await,
            Request::List => self.list(),
        }
    }

    /// Start a new session in `working_directory`
    ///
    /// Always creates a new session, even if one already runs there.
    ///
    /// # Errors
    /// Returns `SpawnError` if the directory is unusable or the process
    /// cannot be started; no session is created in that case
    pub async fn enter(&self, working_directory: &str) -> Result<Outcome> {
        let working_directory = canonical_directory(working_directory).await?;
        let handle = self.controller.spawn(&working_directory, None).await?;

        let record = match self.registry.create(working_directory.clone()) {
            Ok(record) => record,
            Err(e) => {
                self.release(handle, Duration::ZERO).await;
                return Err(e);
            }
        };
        if let Err(e) = self.registry.attach(&record.session_id, handle) {
            self.release(handle, Duration::ZERO).await;
            return Err(e);
        }

        log::info!(
            "[{}] Session started in {} ({handle})",
            record.session_id,
            working_directory.display()
        );
        Ok(Outcome::Entered {
            session_id: record.session_id,
            working_directory,
        })
    }

    /// Forward `message` and wait for the complete response
    ///
    /// There is no timeout; `cancel` stops waiting without hurting the
    /// session.
    ///
    /// Another `cc` process sharing the store waits for this one's turn to
    /// finish before delivering its own.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown or exited ids, `InvalidArgument`
    /// for an empty message, and `DeliveryError` if the process failed or
    /// could not be resumed, in which case the session has been exited
    pub async fn send(
        &self,
        session_id: &SessionId,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if message.trim().is_empty() {
            return Err(SessionError::invalid_argument("message is empty"));
        }
        self.registry.get(session_id)?;

        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        let _file_guard = self.registry.lock_session(session_id).await?;

        let handle = match self.attached_handle(session_id).await {
            Ok(handle) => handle,
            Err(e @ (SessionError::SpawnError(_) | SessionError::CliNotFound(_))) => {
                log::warn!("[{session_id}] Cannot resume session: {e}");
                self.force_exit(session_id, None).await;
                return Err(SessionError::delivery(
                    session_id.as_str(),
                    format!("cannot resume session: {e}"),
                    None,
                ));
            }
            Err(e) => return Err(e),
        };
        let delivery = match self.controller.deliver(handle, message, cancel).await {
            Ok(delivery) => delivery,
            Err(e) => {
                let e = e.for_session(session_id.as_str());
                if e.is_fatal_to_session() {
                    log::warn!("[{session_id}] {e}");
                    self.force_exit(session_id, Some(handle)).await;
                }
                return Err(e);
            }
        };

        match self.registry.update_activity(session_id) {
            Ok(()) => {
                if let Some(conversation_id) = delivery.conversation_id.clone()
                    && let Err(e) = self.registry.set_conversation(session_id, conversation_id)
                {
                    log::warn!("[{session_id}] Failed to record conversation id: {e}");
                }
            }
            Err(SessionError::SessionNotFound(_)) => {
                // Exited from another process while this turn ran
                log::info!("[{session_id}] Session exited elsewhere, releasing {handle}");
                self.release(handle, Duration::ZERO).await;
                self.locks.lock().remove(session_id);
            }
            Err(e) => log::warn!("[{session_id}] Failed to record activity: {e}"),
        }

        let output = truncate_output(format_output(&delivery), self.options.max_output_chars);
        Ok(Outcome::Sent {
            session_id: session_id.clone(),
            output,
        })
    }

    /// Report whether the session's process is alive
    ///
    /// A dead process, or one that cannot be resumed, exits the session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown or exited ids
    pub async fn status(&self, session_id: &SessionId) -> Result<Outcome> {
        let record = self.registry.get(session_id)?;
        let handle = match record.process {
            Some(handle) => handle,
            None => {
                let lock = self.session_lock(session_id);
                let _guard = lock.lock().await;
                match self.attached_handle(session_id).await {
                    Ok(handle) => handle,
                    Err(e @ (SessionError::SpawnError(_) | SessionError::CliNotFound(_))) => {
                        log::warn!("[{session_id}] Cannot resume session, exiting it: {e}");
                        self.force_exit(session_id, None).await;
                        return Ok(Outcome::Status {
                            session_id: session_id.clone(),
                            working_directory: record.working_directory,
                            liveness: Liveness::Dead,
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let liveness = match self.controller.probe(handle) {
            Ok(liveness) => liveness,
            Err(e) => {
                log::debug!("[{session_id}] Probe failed, retrying: {e}");
                self.controller.probe(handle)?
            }
        };

        if liveness == Liveness::Dead {
            log::warn!("[{session_id}] Process is dead, exiting session");
            let lock = self.session_lock(session_id);
            let _guard = lock.lock().await;
            self.force_exit(session_id, Some(handle)).await;
        }

        Ok(Outcome::Status {
            session_id: session_id.clone(),
            working_directory: record.working_directory,
            liveness,
        })
    }

    /// Terminate the session's process and tombstone its id
    ///
    /// Waits up to the grace period for an in-flight `send` to finish, then
    /// kills the process out from under it.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown ids and `AlreadyExited` for ids
    /// that were exited before
    pub async fn exit(&self, session_id: &SessionId) -> Result<Outcome> {
        if let Err(e) = self.registry.get(session_id) {
            return Err(self.missing(session_id, e)?);
        }

        let grace = self.options.grace_period;
        let lock = self.session_lock(session_id);
        let (_guard, interrupted) = match tokio::time::timeout(grace, lock.lock()).await {
            Ok(guard) => (guard, false),
            Err(_) => {
                log::info!("[{session_id}] Send still in flight after {grace:?}, interrupting");
                if let Ok(record) = self.registry.get(session_id)
                    && let Some(handle) = record.process
                {
                    self.release(handle, Duration::ZERO).await;
                }
                (lock.lock().await, true)
            }
        };

        if let Err(e) = self.registry.get(session_id) {
            // The interrupted send already tore the session down
            if interrupted && self.registry.is_retired(session_id)? {
                self.locks.lock().remove(session_id);
                return Ok(Outcome::Exited {
                    session_id: session_id.clone(),
                });
            }
            return Err(self.missing(session_id, e)?);
        }

        if let Some(handle) = self.registry.detach(session_id) {
            self.release(handle, grace).await;
        }
        self.registry.remove(session_id)?;
        self.locks.lock().remove(session_id);

        log::info!("[{session_id}] Session exited");
        Ok(Outcome::Exited {
            session_id: session_id.clone(),
        })
    }

    /// Summaries of every live session, oldest first
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub fn list(&self) -> Result<Outcome> {
        let sessions = self
            .registry
            .list()?
            .iter()
            .map(SessionSummary::from)
            .collect();
        Ok(Outcome::Listed { sessions })
    }

    /// Exit every session idle for longer than `max_idle`
    ///
    /// Sessions with a `send` in flight are skipped. Returns the evicted ids.
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub async fn evict_idle(&self, max_idle: Duration) -> Result<Vec<SessionId>> {
        let max_idle = chrono::Duration::from_std(max_idle)
            .map_err(|e| SessionError::invalid_argument(format!("idle timeout: {e}")))?;
        let cutoff = Utc::now() - max_idle;

        let mut evicted = Vec::new();
        for session_id in self.registry.idle_since(cutoff)? {
            if self.is_busy(&session_id) {
                continue;
            }
            match self.exit(&session_id).await {
                Ok(_) => {
                    log::info!("[{session_id}] Evicted after {max_idle} idle");
                    evicted.push(session_id);
                }
                Err(SessionError::SessionNotFound(_) | SessionError::AlreadyExited(_)) => {}
                Err(e) => log::warn!("[{session_id}] Eviction failed: {e}"),
            }
        }
        Ok(evicted)
    }

    /// Release every attached process, keeping the sessions resumable
    pub async fn detach_all(&self) {
        for session_id in self.registry.attached() {
            let lock = self.session_lock(&session_id);
            let _guard = lock.lock().await;
            if let Some(handle) = self.registry.detach(&session_id) {
                log::debug!("[{session_id}] Detaching {handle}");
                self.release(handle, self.options.grace_period).await;
            }
        }
    }

    /// Exit every session
    ///
    /// # Errors
    /// Returns error if the store cannot be read
    pub async fn shutdown(&self) -> Result<()> {
        log::info!("Shutting down session manager...");

        for record in self.registry.list()? {
            log::debug!("Exiting session: {}", record.session_id);
            if let Err(e) = self.exit(&record.session_id).await {
                log::warn!("Failed to exit session {}: {}", record.session_id, e);
            }
        }

        log::info!("Session manager shutdown complete");
        Ok(())
    }

    /// Handle of the session's process, re-attaching a detached session
    ///
    /// Callers must hold the session lock.
    async fn attached_handle(&self, session_id: &SessionId) -> Result<ProcessHandle> {
        let record = self.registry.get(session_id)?;
        if let Some(handle) = record.process {
            return Ok(handle);
        }

        let handle = self
            .controller
            .spawn(&record.working_directory, record.conversation_id.as_deref())
            .await?;
        if let Err(e) = self.registry.attach(session_id, handle) {
            self.release(handle, Duration::ZERO).await;
            return Err(e);
        }
        log::debug!(
            "[{session_id}] Re-attached as {handle}{}",
            record
                .conversation_id
                .as_deref()
                .map(|id| format!(", resuming {id}"))
                .unwrap_or_default()
        );
        Ok(handle)
    }

    /// Tear down a session whose process failed or could not be started
    ///
    /// Best-effort: a session already removed by a concurrent exit is fine.
    async fn force_exit(&self, session_id: &SessionId, handle: Option<ProcessHandle>) {
        self.registry.detach(session_id);
        if let Some(handle) = handle {
            self.release(handle, Duration::ZERO).await;
        }
        match self.registry.remove(session_id) {
            Ok(_) => log::info!("[{session_id}] Session force-exited"),
            Err(SessionError::SessionNotFound(_) | SessionError::AlreadyExited(_)) => {}
            Err(e) => log::warn!("[{session_id}] Failed to remove session: {e}"),
        }
        self.locks.lock().remove(session_id);
    }

    async fn release(&self, handle: ProcessHandle, grace: Duration) {
        if let Err(e) = self.controller.terminate(handle, grace).await {
            log::warn!("Failed to terminate {handle}: {e}");
        }
    }

    /// Refine a lookup failure into `AlreadyExited` for tombstoned ids
    fn missing(&self, session_id: &SessionId, err: SessionError) -> Result<SessionError> {
        if self.registry.is_retired(session_id)? {
            Ok(SessionError::already_exited(session_id.as_str()))
        } else {
            Ok(err)
        }
    }

    fn session_lock(&self, session_id: &SessionId) -> SessionLock {
        Arc::clone(self.locks.lock().entry(session_id.clone()).or_default())
    }

    fn is_busy(&self, session_id: &SessionId) -> bool {
        self.locks
            .lock()
            .get(session_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

/// Validate and canonicalize a working directory
async fn canonical_directory(path: &str) -> Result<PathBuf> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
        SessionError::spawn(format!("working directory {path} is not accessible: {e}"))
    })?;
    let metadata = tokio::fs::metadata(&canonical).await.map_err(|e| {
        SessionError::spawn(format!("working directory {path} is not accessible: {e}"))
    })?;
    if !metadata.is_dir() {
        return Err(SessionError::spawn(format!(
            "working directory {path} is not a directory"
        )));
    }
    Ok(canonical)
}
