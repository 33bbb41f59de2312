//! Background worker owning one Claude Code process
//!
//! The worker is the only code that touches the child's pipes. Requests
//! arrive over an mpsc queue and are answered through oneshot channels, so
//! deliveries to one process are strictly sequential and each answer goes
//! back to the request that asked for it.

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::message::{assistant_text, parse_line};
use crate::types::identifiers::ProcessHandle;
use crate::types::messages::Message;

use super::Delivery;

/// Commands that can be sent to a process worker
pub(super) enum ProcessCommand {
    /// Write one user turn and wait for its result
    Deliver {
        /// The message text to send
        text: String,
        /// Channel to send the turn's outcome back
        response_tx: oneshot::Sender<Result<Delivery>>,
    },

    /// Close stdin and wait for the process to exit
    Shutdown {
        /// How long to wait before killing the process
        grace: Duration,
        /// Channel to send the shutdown confirmation back
        response_tx: oneshot::Sender<Result<()>>,
    },
}

/// Handles kept in the process table for a running worker
pub(super) struct WorkerHandle {
    pub command_tx: mpsc::UnboundedSender<ProcessCommand>,
    pub alive: Arc<AtomicBool>,
    pub kill: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Pipes and limits handed to a new worker
pub(super) struct WorkerSpawn {
    pub handle: ProcessHandle,
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub max_line_bytes: usize,
    pub stderr_tail_lines: usize,
}

/// Shared state for one worker
struct WorkerContext {
    handle: ProcessHandle,
    alive: Arc<AtomicBool>,
    kill: CancellationToken,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl WorkerContext {
    fn delivery_error(&self, msg: impl Into<String>) -> SessionError {
        let tail = self.stderr_tail.lock();
        let stderr = if tail.is_empty() {
            None
        } else {
            Some(tail.iter().cloned().collect::<Vec<_>>().join("\n"))
        };
        SessionError::delivery(self.handle.to_string(), msg, stderr)
    }
}

/// Spawn the worker task (and its stderr drain) for a freshly started child
pub(super) fn spawn_worker(spawn: WorkerSpawn) -> WorkerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));
    let kill = CancellationToken::new();
    let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(spawn.stderr_tail_lines)));

    spawn_stderr_drain(
        spawn.handle,
        spawn.stderr,
        Arc::clone(&stderr_tail),
        spawn.stderr_tail_lines,
    );

    let ctx = WorkerContext {
        handle: spawn.handle,
        alive: Arc::clone(&alive),
        kill: kill.clone(),
        stderr_tail,
    };
    let lines = FramedRead::new(
        spawn.stdout,
        LinesCodec::new_with_max_length(spawn.max_line_bytes),
    );
    let task = tokio::spawn(run_worker(spawn.child, spawn.stdin, lines, command_rx, ctx));

    WorkerHandle {
        command_tx,
        alive,
        kill,
        task,
    }
}

/// Forward stderr to the log and keep its last lines for error reports
fn spawn_stderr_drain(
    handle: ProcessHandle,
    stderr: ChildStderr,
    tail: Arc<Mutex<VecDeque<String>>>,
    keep: usize,
) {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stderr, LinesCodec::new_with_max_length(64 * 1024));
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    log::debug!("[{handle}] stderr: {line}");
                    if keep == 0 {
                        continue;
                    }
                    let mut tail = tail.lock();
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Err(LinesCodecError::MaxLineLengthExceeded) => continue,
                Err(LinesCodecError::Io(_)) => break,
            }
        }
    });
}

async fn run_worker(
    mut child: Child,
    stdin: ChildStdin,
    mut lines: FramedRead<ChildStdout, LinesCodec>,
    mut command_rx: mpsc::UnboundedReceiver<ProcessCommand>,
    ctx: WorkerContext,
) {
    let mut stdin = Some(stdin);

    loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(ProcessCommand::Deliver { text, response_tx }) => {
                    let result = tokio::select! {
                        r = exchange(&mut stdin, &mut lines, &text, &ctx) => r,
                        () = ctx.kill.cancelled() => {
                            Err(ctx.delivery_error("process was terminated during delivery"))
                        }
                    };
                    // A failed exchange leaves the stream at an unknown offset
                    let failed = result.is_err();
                    let _ = response_tx.send(result);
                    if failed {
                        break;
                    }
                }
                Some(ProcessCommand::Shutdown { grace, response_tx }) => {
                    let result = shutdown(&mut child, stdin.take(), grace, &ctx).await;
                    ctx.alive.store(false, Ordering::SeqCst);
                    let _ = response_tx.send(result);
                    drain_queue(&mut command_rx, &ctx);
                    return;
                }
                None => break,
            },
            status = child.wait() => {
                match status {
                    Ok(status) => log::info!("[{}] Claude Code exited: {}", ctx.handle, status),
                    Err(e) => log::warn!("[{}] Failed to wait on Claude Code: {}", ctx.handle, e),
                }
                break;
            }
            () = ctx.kill.cancelled() => break,
        }
    }

    ctx.alive.store(false, Ordering::SeqCst);
    drop(stdin);
    let _ = child.start_kill();
    let _ = child.wait().await;
    drain_queue(&mut command_rx, &ctx);
}

/// Fail every request still queued behind a dead process
fn drain_queue(command_rx: &mut mpsc::UnboundedReceiver<ProcessCommand>, ctx: &WorkerContext) {
    command_rx.close();
    while let Ok(cmd) = command_rx.try_recv() {
        match cmd {
            ProcessCommand::Deliver { response_tx, .. } => {
                let _ = response_tx.send(Err(ctx.delivery_error("process is no longer running")));
            }
            ProcessCommand::Shutdown { response_tx, .. } => {
                let _ = response_tx.send(Ok(()));
            }
        }
    }
}

/// Write one user turn and read stdout until its result message
async fn exchange(
    stdin: &mut Option<ChildStdin>,
    lines: &mut FramedRead<ChildStdout, LinesCodec>,
    text: &str,
    ctx: &WorkerContext,
) -> Result<Delivery> {
    let stdin = stdin
        .as_mut()
        .ok_or_else(|| ctx.delivery_error("stdin is closed"))?;

    // Send a user message in the format the CLI expects
    let message = serde_json::json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": text
        }
    });
    let message_json = format!("{}\n", serde_json::to_string(&message)?);

    stdin
        .write_all(message_json.as_bytes())
        .await
        .map_err(|e| ctx.delivery_error(format!("Failed to write to stdin: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| ctx.delivery_error(format!("Failed to flush stdin: {e}")))?;

    let mut conversation_id = None;
    let mut last_assistant_text = None;

    loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                return Err(ctx.delivery_error("output line exceeded the maximum length"));
            }
            Some(Err(LinesCodecError::Io(e))) => {
                return Err(ctx.delivery_error(format!("Failed to read stdout: {e}")));
            }
            None => {
                return Err(ctx.delivery_error("process exited before completing the response"));
            }
        };

        let msg = match parse_line(&line) {
            Ok(Some(msg)) => msg,
            Ok(None) => continue,
            Err(e) => return Err(ctx.delivery_error(e.to_string())),
        };

        if let Some(id) = msg.session_id() {
            conversation_id = Some(id.to_string());
        }
        if let Some(text) = assistant_text(&msg) {
            last_assistant_text = Some(text);
        }

        if let Message::Result {
            result, is_error, ..
        } = msg
        {
            let output = result
                .filter(|r| !r.is_empty())
                .or(last_assistant_text)
                .unwrap_or_default();
            return Ok(Delivery {
                output,
                conversation_id,
                is_error,
            });
        }
    }
}

/// Close stdin, then wait up to `grace` before killing the process
async fn shutdown(
    child: &mut Child,
    stdin: Option<ChildStdin>,
    grace: Duration,
    ctx: &WorkerContext,
) -> Result<()> {
    if let Some(mut stdin) = stdin {
        let _ = stdin.shutdown().await;
    }

    let graceful = tokio::select! {
        r = tokio::time::timeout(grace, child.wait()) => r.ok(),
        () = ctx.kill.cancelled() => None,
    };

    match graceful {
        Some(Ok(status)) => {
            log::debug!("[{}] Claude Code exited gracefully: {}", ctx.handle, status);
            Ok(())
        }
        Some(Err(e)) => Err(SessionError::Io(e)),
        None => {
            log::info!("[{}] Claude Code did not exit in {:?}, killing", ctx.handle, grace);
            let _ = child.start_kill();
            child.wait().await?;
            Ok(())
        }
    }
}
