//! Integration tests for the serve loop
//!
//! Feeds requests through an in-memory pipe and reads records back.

mod common;

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio_util::sync::CancellationToken;

use claude_code_session::serve::serve;
use claude_code_session::{ManagerOptions, Outcome, SessionRegistry};
use common::{init_logging, manager, manager_with};

async fn call(
    requests: &mut DuplexStream,
    records: &mut Lines<BufReader<DuplexStream>>,
    request: Value,
) -> Value {
    requests
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();
    let line = records.next_line().await.unwrap().unwrap();
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn test_serve_round_trip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager());

    let (mut requests, input) = tokio::io::duplex(64 * 1024);
    let (output, records) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(serve(
        Arc::clone(&manager),
        input,
        output,
        CancellationToken::new(),
    ));
    let mut records = BufReader::new(records).lines();

    let entered = call(
        &mut requests,
        &mut records,
        json!({"verb": "enter", "working_directory": dir.path(), "request_id": "r1"}),
    )
    .await;
    assert_eq!(entered["request_id"], "r1");
    let id = entered["session_id"].as_str().unwrap().to_string();

    let sent = call(
        &mut requests,
        &mut records,
        json!({"verb": "send", "session_id": id, "message": "hi", "request_id": 2}),
    )
    .await;
    assert_eq!(sent["request_id"], 2);
    assert_eq!(sent["output"], "echo: hi");

    let status = call(&mut requests, &mut records, json!({"verb": "status", "session_id": id})).await;
    assert_eq!(status["status"], "alive");

    let exited = call(&mut requests, &mut records, json!({"verb": "exit", "session_id": id})).await;
    assert_eq!(exited["status"], "exited");

    let again = call(
        &mut requests,
        &mut records,
        json!({"verb": "exit", "session_id": id, "request_id": "last"}),
    )
    .await;
    assert_eq!(again["request_id"], "last");
    assert_eq!(again["error"]["kind"], "already_exited");

    drop(requests);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(manager.controller().running(), 0);
}

#[tokio::test]
async fn test_serve_reports_bad_lines_and_detaches_on_eof() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager());
    let input = format!(
        "not-a-verb\n\n{{\"verb\":\"enter\",\"working_directory\":{},\"request_id\":7}}\n",
        json!(dir.path())
    );
    let mut output = Vec::new();

    serve(
        Arc::clone(&manager),
        input.as_bytes(),
        &mut output,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let records: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["error"]["kind"], "invalid_argument");
    assert_eq!(records[1]["request_id"], 7);

    // EOF detaches, but the session stays resumable
    assert_eq!(manager.controller().running(), 0);
    let sessions = manager.registry().list().unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].is_attached());
}

#[tokio::test]
async fn test_serve_reaps_idle_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(manager_with(
        SessionRegistry::in_memory(),
        ManagerOptions::builder()
            .idle_timeout(Duration::from_millis(200))
            .build(),
    ));
    let id = match manager.enter(dir.path().to_str().unwrap()).await.unwrap() {
        Outcome::Entered { session_id, .. } => session_id,
        other => panic!("expected Entered, got {other:?}"),
    };

    let (requests, input) = tokio::io::duplex(1024);
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(
        Arc::clone(&manager),
        input,
        tokio::io::sink(),
        shutdown.clone(),
    ));

    // Reaper runs every second at the shortest
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(manager.registry().is_retired(&id).unwrap());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    drop(requests);
}
