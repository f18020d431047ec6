//! Shared scaffolding for broker integration tests: an in-memory duplex
//! transport and a fully wired broker instance per test case.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use toolbus::broker::{Broker, ResponseWriter};
use toolbus::cache::MemoCache;
use toolbus::config::BrokerConfig;
use toolbus::dispatch::{CallContext, MethodRegistry};
use toolbus::procs::ProcessRegistry;
use toolbus::supervisor::parent::AlwaysAlive;

/// Tag stamped on every response emitted by test brokers.
pub const TEST_TAG: &str = "test-tag";

/// Broker tunables for tests: small pool, drain everything before
/// returning, treat end-of-input as final.
pub fn test_config() -> BrokerConfig {
    BrokerConfig {
        workers: 4,
        queue_depth: 64,
        tag: TEST_TAG.to_owned(),
        decorate: false,
        wait: true,
        single_shot: true,
        ..BrokerConfig::default()
    }
}

/// Parse every line the broker wrote, until its writer is dropped.
pub async fn collect_lines(read_half: tokio::io::DuplexStream) -> Vec<Value> {
    let mut lines = BufReader::new(read_half).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.unwrap_or(None) {
        out.push(serde_json::from_str(&line).expect("every record must be valid JSON"));
    }
    out
}

/// Run `input` through a broker over the given registry and return every
/// response it emitted.
pub async fn run_broker(registry: MethodRegistry, input: &str) -> Vec<Value> {
    run_broker_with(registry, input, test_config(), Arc::new(ProcessRegistry::new())).await
}

/// As [`run_broker`], with explicit tunables and a caller-owned process
/// registry.
pub async fn run_broker_with(
    registry: MethodRegistry,
    input: &str,
    config: BrokerConfig,
    procs: Arc<ProcessRegistry>,
) -> Vec<Value> {
    let (read_half, write_half) = tokio::io::duplex(1024 * 1024);
    let writer = Arc::new(ResponseWriter::new(write_half, config.tag.clone()));
    let cache = Arc::new(MemoCache::new("test", 32, Duration::from_secs(60)));
    let ctx = CallContext::new(procs, cache);

    let broker = Arc::new(Broker::new(config, Arc::new(registry), writer, ctx));
    let reader_task = tokio::spawn(collect_lines(read_half));

    let input = std::io::Cursor::new(input.as_bytes().to_vec());
    Arc::clone(&broker).serve(input, Arc::new(AlwaysAlive)).await;
    drop(broker);

    reader_task.await.expect("reader task must not panic")
}
