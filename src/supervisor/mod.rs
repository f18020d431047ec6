//! Top-level process lifecycle.
//!
//! Wires together the broker, the shared handler services, the optional
//! heartbeat, and the shutdown hooks, then runs the accept loop to
//! completion. Shutdown hooks run concurrently with per-hook panic
//! isolation once the loop ends.

pub mod parent;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::{Broker, ResponseWriter};
use crate::cache::{spawn_sweep_task, MemoCache};
use crate::config::{BrokerConfig, DEFAULT_SWEEP_INTERVAL};
use crate::dispatch::{CallContext, MethodRegistry};
use crate::procs::ProcessRegistry;
use crate::proto::{Response, POLL_TOKEN};
use crate::{AppError, Result};

use parent::{os_parent, AlwaysAlive, ParentWatch};

/// One deferred shutdown action.
type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Actions deferred until process shutdown: draining the process
/// registry, final notifications, and similar cleanup.
///
/// Hooks are registered during startup and drained exactly once, running
/// concurrently; a panicking hook is logged and never blocks the others.
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Mutex<Vec<(&'static str, Hook)>>,
}

impl ShutdownHooks {
    /// Create an empty hook list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defer `hook` under a diagnostic `name`.
    pub fn push(&self, name: &'static str, hook: Hook) {
        match self.hooks.lock() {
            Ok(mut hooks) => hooks.push((name, hook)),
            Err(poisoned) => poisoned.into_inner().push((name, hook)),
        }
    }

    /// Run every registered hook concurrently and wait for all of them.
    pub async fn run_all(&self) {
        let hooks = match self.hooks.lock() {
            Ok(mut hooks) => std::mem::take(&mut *hooks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let tasks: Vec<_> = hooks
            .into_iter()
            .map(|(name, hook)| {
                let task = tokio::spawn(hook());
                async move {
                    if let Err(err) = task.await {
                        error!(hook = name, %err, "shutdown hook failed");
                    }
                }
            })
            .collect();
        join_all(tasks).await;
    }
}

/// Spawn the periodic heartbeat: an unsolicited, sequence-numbered
/// response on the reserved poll token, useful for client-side health
/// checks.
#[must_use]
pub fn spawn_heartbeat(
    writer: Arc<ResponseWriter>,
    interval: Duration,
    ct: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seq: u64 = 0;
        loop {
            tokio::select! {
                () = ct.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    seq += 1;
                    writer
                        .send(Response::ok(
                            POLL_TOKEN,
                            json!({
                                "time": chrono::Utc::now().to_rfc3339(),
                                "seq": seq.to_string(),
                            }),
                        ))
                        .await;
                }
            }
        }
    })
}

/// Run the full broker lifecycle over the given duplex stream.
///
/// Builds the lifecycle-scoped services (process registry, dedup cache,
/// response writer), verifies the parent is alive, starts the heartbeat
/// and cache sweep, serves until the accept loop returns, then runs the
/// shutdown hooks. Returns the number of records served.
///
/// # Errors
///
/// Returns [`AppError::Config`] when the configuration is invalid or the
/// parent process is already gone at startup.
pub async fn run<R, W>(
    config: BrokerConfig,
    registry: Arc<MethodRegistry>,
    reader: R,
    out: W,
) -> Result<u64>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    config.validate()?;

    let parent: Arc<dyn ParentWatch> = if config.single_shot {
        Arc::new(AlwaysAlive)
    } else {
        os_parent()
    };
    if !config.single_shot && !parent.alive() {
        return Err(AppError::Config("parent process is not alive".into()));
    }

    let procs = Arc::new(ProcessRegistry::new());
    let cache = Arc::new(MemoCache::new(
        "handlers",
        config.cache_capacity,
        config.cache_ttl,
    ));
    let writer = Arc::new(ResponseWriter::new(out, config.tag.clone()));
    let ctx = CallContext::new(Arc::clone(&procs), Arc::clone(&cache));

    let ct = CancellationToken::new();
    let sweep_handle = spawn_sweep_task(Arc::clone(&cache), DEFAULT_SWEEP_INTERVAL, ct.clone());
    let heartbeat_handle = config
        .heartbeat
        .map(|interval| spawn_heartbeat(Arc::clone(&writer), interval, ct.clone()));

    let hooks = ShutdownHooks::new();
    {
        let procs = Arc::clone(&procs);
        hooks.push(
            "kill-tracked-processes",
            Box::new(move || Box::pin(async move { procs.kill_all().await })),
        );
    }

    let broker = Arc::new(Broker::new(
        config,
        registry,
        Arc::clone(&writer),
        ctx,
    ));
    let served = broker.serve(reader, parent).await;

    ct.cancel();
    hooks.run_all().await;
    if let Err(err) = sweep_handle.await {
        warn!(%err, "sweep task failed");
    }
    if let Some(handle) = heartbeat_handle {
        if let Err(err) = handle.await {
            warn!(%err, "heartbeat task failed");
        }
    }

    info!(served, "broker shut down");
    Ok(served)
}
