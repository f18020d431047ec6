//! Unit tests for the mutex-guarded response writer.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use toolbus::broker::ResponseWriter;
use toolbus::proto::Response;

/// Read every line the writer produced, after all writer handles are gone.
async fn collect_lines(read_half: tokio::io::DuplexStream) -> Vec<Value> {
    let mut lines = BufReader::new(read_half).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap_or(None) {
        out.push(serde_json::from_str(&line).expect("every record must be valid JSON"));
    }
    out
}

/// Null data is replaced with the `{}` sentinel and an empty tag gets the
/// instance tag.
#[tokio::test]
async fn defaults_are_filled_in() {
    let (read_half, write_half) = tokio::io::duplex(64 * 1024);
    let writer = ResponseWriter::new(write_half, "tag-a");

    writer.send(Response::failure("t1", "boom")).await;
    drop(writer);

    let lines = collect_lines(read_half).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["token"], "t1");
    assert_eq!(lines[0]["error"], "boom");
    assert_eq!(lines[0]["tag"], "tag-a");
    assert_eq!(lines[0]["data"], json!({}), "data must never be null on the wire");
}

/// A response that sets its own tag keeps it.
#[tokio::test]
async fn explicit_tag_is_preserved() {
    let (read_half, write_half) = tokio::io::duplex(64 * 1024);
    let writer = ResponseWriter::new(write_half, "tag-a");

    let mut resp = Response::ok("t1", json!({"x": 1}));
    resp.tag = "other".to_owned();
    writer.send(resp).await;
    drop(writer);

    let lines = collect_lines(read_half).await;
    assert_eq!(lines[0]["tag"], "other");
    assert_eq!(lines[0]["data"], json!({"x": 1}));
}

/// Concurrent sends never interleave partial records: every emitted line
/// is one complete JSON object.
#[tokio::test]
async fn concurrent_sends_stay_atomic() {
    let (read_half, write_half) = tokio::io::duplex(1024 * 1024);
    let writer = Arc::new(ResponseWriter::new(write_half, "tag-a"));

    let reader = tokio::spawn(collect_lines(read_half));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let writer = Arc::clone(&writer);
        tasks.push(tokio::spawn(async move {
            let payload = json!({ "i": i, "filler": "x".repeat(2048) });
            writer.send(Response::ok(format!("t{i}"), payload)).await;
        }));
    }
    for task in tasks {
        task.await.expect("send task");
    }
    drop(writer);

    let lines = reader.await.expect("reader task");
    assert_eq!(lines.len(), 32);

    let mut tokens: Vec<String> = lines
        .iter()
        .map(|line| line["token"].as_str().expect("token is a string").to_owned())
        .collect();
    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 32, "every response must appear exactly once");
}

/// Write failures are logged, not propagated: sending after the read side
/// is gone must not panic.
#[tokio::test]
async fn write_failure_does_not_panic() {
    let (read_half, write_half) = tokio::io::duplex(64);
    drop(read_half);
    let writer = ResponseWriter::new(write_half, "tag-a");

    writer.send(Response::ok("t1", json!({"x": 1}))).await;
}
