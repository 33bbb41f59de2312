//! Long-lived request loop
//!
//! Reads one request per line and writes one record per line. Requests run
//! as independent tasks, so a slow `send` on one session never holds up
//! another; records are written in completion order and carry the caller's
//! `request_id` for matching.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SessionError};
use crate::manager::{Request, SessionManager, spawn_idle_reaper};
use crate::process::ProcessController;
use crate::record::Record;

/// Longest request line accepted
const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Parse one request line
///
/// Lines starting with `{` are JSON objects tagged by `verb`; anything else
/// is read as whitespace-separated `<verb> [session_id] [argument]`, except
/// that everything after `enter` is the path, spaces included. The request
/// id is returned even when the rest of the line is unusable.
pub fn parse_request(line: &str) -> (Option<Value>, Result<Request>) {
    let line = line.trim();
    if !line.starts_with('{') {
        if let Some(path) = line.strip_prefix("enter")
            && path.starts_with(char::is_whitespace)
        {
            return (None, Request::parse(&["enter", path.trim()]));
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        return (None, Request::parse(&words));
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return (
                None,
                Err(SessionError::invalid_argument(format!("malformed request: {e}"))),
            );
        }
    };
    let request_id = value.get("request_id").cloned();
    let request = serde_json::from_value::<Request>(value)
        .map_err(|e| SessionError::invalid_argument(format!("malformed request: {e}")))
        .and_then(|request| request.validate().map(|()| request));
    (request_id, request)
}

/// Serve requests from `input` until it closes or `shutdown` fires
///
/// In-flight requests are allowed to finish (or are cancelled, on
/// shutdown), then every attached process is detached so sessions stay
/// resumable.
///
/// # Errors
/// Returns error if writing to `output` fails
pub async fn serve<C, R, W>(
    manager: Arc<SessionManager<C>>,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    C: ProcessController,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let reaper_stop = shutdown.child_token();
    let reaper = manager
        .options()
        .idle_timeout
        .map(|timeout| spawn_idle_reaper(Arc::clone(&manager), timeout, reaper_stop.clone()));

    let (record_tx, mut record_rx) = mpsc::unbounded_channel::<Record>();
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_REQUEST_BYTES));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next() => match line {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (request_id, request) = parse_request(&line);
                    let request = match request {
                        Ok(request) => request,
                        Err(e) => {
                            let record = Record::from_error(None, &e).with_request_id(request_id);
                            write_record(&mut output, &record).await?;
                            continue;
                        }
                    };

                    let manager = Arc::clone(&manager);
                    let record_tx = record_tx.clone();
                    let cancel = shutdown.child_token();
                    tasks.spawn(async move {
                        let record = manager
                            .dispatch(request, &cancel)
                            .await
                            .with_request_id(request_id);
                        let _ = record_tx.send(record);
                    });
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    let err = SessionError::invalid_argument("request line too long");
                    write_record(&mut output, &Record::from_error(None, &err)).await?;
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    log::warn!("Failed to read request: {e}");
                    break;
                }
                None => break,
            },
            Some(record) = record_rx.recv() => write_record(&mut output, &record).await?,
            Some(joined) = tasks.join_next() => {
                if let Err(e) = joined {
                    log::warn!("Request task failed: {e}");
                }
            }
            () = shutdown.cancelled() => {
                log::info!("Shutdown requested, cancelling in-flight requests");
                break;
            }
        }
    }

    drop(record_tx);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            log::warn!("Request task failed: {e}");
        }
    }
    while let Some(record) = record_rx.recv().await {
        write_record(&mut output, &record).await?;
    }

    reaper_stop.cancel();
    if let Some(reaper) = reaper
        && let Err(e) = reaper.await
    {
        log::warn!("Reaper task failed: {e}");
    }
    manager.detach_all().await;
    Ok(())
}

async fn write_record<W: AsyncWrite + Unpin>(output: &mut W, record: &Record) -> Result<()> {
    let mut line = record.to_json();
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::identifiers::SessionId;

    #[test]
    fn parses_json_requests_with_id() {
        let (id, request) =
            parse_request(r#"{"verb":"status","session_id":"s1","request_id":"r-1"}"#);
        assert_eq!(id, Some(Value::from("r-1")));
        assert_eq!(
            request.unwrap(),
            Request::Status {
                session_id: SessionId::new("s1")
            }
        );
    }

    #[test]
    fn parses_plain_word_requests() {
        let (id, request) = parse_request("send s1 hello there");
        assert!(id.is_none());
        assert_eq!(
            request.unwrap(),
            Request::Send {
                session_id: SessionId::new("s1"),
                message: "hello there".into()
            }
        );
    }

    #[test]
    fn plain_enter_keeps_spaces_in_path() {
        let (_, request) = parse_request("enter  /work/my project/app ");
        assert_eq!(
            request.unwrap(),
            Request::Enter {
                working_directory: "/work/my project/app".into()
            }
        );

        let (_, request) = parse_request("enter");
        assert!(matches!(request, Err(SessionError::InvalidArgument(_))));
        let (_, request) = parse_request("entering /tmp");
        assert!(matches!(request, Err(SessionError::InvalidArgument(_))));
    }

    #[test]
    fn keeps_request_id_of_bad_requests() {
        let (id, request) = parse_request(r#"{"verb":"launch","request_id":3}"#);
        assert_eq!(id, Some(Value::from(3)));
        assert!(matches!(request, Err(SessionError::InvalidArgument(_))));

        let (_, request) = parse_request(r#"{"verb":"send","session_id":"s1","message":""}"#);
        assert!(matches!(request, Err(SessionError::InvalidArgument(_))));

        let (id, request) = parse_request("{not json");
        assert!(id.is_none());
        assert!(request.is_err());
    }
}
