//! The request broker: accept loop, worker pool, and dispatch.
//!
//! One task reads the input stream sequentially, preserving arrival order,
//! and feeds raw records through a bounded queue to a fixed pool of
//! workers. Workers parse, dispatch, and execute independently, so
//! responses may be emitted in a different order than their requests
//! arrived; clients must correlate by token, never by position.

pub mod writer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde_json::json;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::FramedRead;
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::dispatch::{CallContext, MethodRegistry};
use crate::proto::codec::LineCodec;
use crate::proto::{salvage_token, Request, Response, BYE_TOKEN, HELLO_TOKEN};
use crate::supervisor::parent::ParentWatch;

pub use writer::ResponseWriter;

/// Delay before retrying a read after a spurious end-of-file, avoiding a
/// hot loop while the transport oscillates between "no data" and EOF.
const EOF_RETRY_DELAY: Duration = Duration::from_millis(5);

/// The line-oriented protocol engine.
///
/// Owns the dispatch surface (method registry, call context, response
/// writer) and runs the accept loop plus worker pool over a duplex byte
/// stream.
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<MethodRegistry>,
    writer: Arc<ResponseWriter>,
    ctx: CallContext,
    served: AtomicU64,
}

impl Broker {
    /// Build a broker over an already-populated method registry.
    #[must_use]
    pub fn new(
        config: BrokerConfig,
        registry: Arc<MethodRegistry>,
        writer: Arc<ResponseWriter>,
        ctx: CallContext,
    ) -> Self {
        Self {
            config,
            registry,
            writer,
            ctx,
            served: AtomicU64::new(0),
        }
    }

    /// The response writer owned by this broker.
    #[must_use]
    pub fn writer(&self) -> Arc<ResponseWriter> {
        Arc::clone(&self.writer)
    }

    /// Number of records handed to workers so far.
    #[must_use]
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }

    /// Run the accept loop until the input is exhausted, then drain.
    ///
    /// End-of-stream is the normal termination signal, but only once the
    /// parent process is confirmed dead (or in single-shot mode); an EOF
    /// while the parent still lives is treated as spurious and retried
    /// after a short pause. Returns the number of records served.
    pub async fn serve<R>(self: Arc<Self>, reader: R, parent: Arc<dyn ParentWatch>) -> u64
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let start = Instant::now();

        if self.config.decorate {
            self.writer
                .send(Response::ok(
                    HELLO_TOKEN,
                    json!({ "time": chrono::Utc::now().to_rfc3339() }),
                ))
                .await;
        }

        let (tx, rx) = mpsc::channel::<String>(self.config.queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let broker = Arc::clone(&self);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move { broker.worker(rx).await }));
        }

        let mut lines = FramedRead::new(reader, LineCodec::new());
        loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    // A full queue blocks here: backpressure on the wire.
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "cannot read input");
                    self.writer
                        .send(Response::transport_error(err.to_string()))
                        .await;
                }
                None => {
                    if self.config.single_shot {
                        break;
                    }
                    if !parent.alive() {
                        info!("exiting: parent process died");
                        break;
                    }
                    tokio::time::sleep(EOF_RETRY_DELAY).await;
                    lines = FramedRead::new(lines.into_inner(), LineCodec::new());
                }
            }
        }

        drop(tx);
        if self.config.wait {
            for handle in workers {
                if let Err(err) = handle.await {
                    warn!(%err, "worker task failed");
                }
            }
        }

        if self.config.decorate {
            self.writer
                .send(Response::ok(
                    BYE_TOKEN,
                    json!({
                        "served": self.served(),
                        "uptime": format!("{:.3}s", start.elapsed().as_secs_f64()),
                    }),
                ))
                .await;
        }

        self.served()
    }

    /// Worker loop: pull one queued record at a time, run it to
    /// completion, repeat until the queue closes.
    async fn worker(self: Arc<Self>, rx: Arc<Mutex<mpsc::Receiver<String>>>) {
        loop {
            let line = { rx.lock().await.recv().await };
            match line {
                Some(line) => Arc::clone(&self).handle_record(line).await,
                None => break,
            }
        }
    }

    /// Process one raw input record end to end.
    async fn handle_record(self: Arc<Self>, line: String) {
        if line.trim().is_empty() {
            return;
        }
        self.served.fetch_add(1, Ordering::Relaxed);

        let req: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                warn!(%err, "cannot decode request envelope");
                // Answer only if the record still carried a usable token;
                // otherwise there is nothing to correlate a reply with.
                if let Some(token) = salvage_token(&line) {
                    self.writer
                        .send(Response::failure(token, format!("invalid request: {err}")))
                        .await;
                }
                return;
            }
        };

        if req.method.is_empty() {
            warn!("request is missing a method name");
            if !req.token.is_empty() {
                self.writer
                    .send(Response::failure(req.token, "missing method name"))
                    .await;
            }
            return;
        }

        if self.registry.lookup(&req.method).is_none() {
            let msg = format!(
                "invalid method {:?}; valid methods are: {}",
                req.method,
                self.registry.names().join(", ")
            );
            warn!(method = %req.method, "unknown method");
            if !req.token.is_empty() {
                self.writer.send(Response::failure(req.token, msg)).await;
            }
            return;
        }

        let method = req.method.clone();
        let token = req.token.clone();

        // Handler construction, body deserialization, and execution all run
        // inside a separate task: its JoinError is the panic boundary.
        let broker = Arc::clone(&self);
        let handle = tokio::spawn(async move { broker.invoke(req).await });
        if let Err(join_err) = handle.await {
            if join_err.is_panic() {
                error!(
                    method = %method,
                    token = %token,
                    panic = %panic_message(join_err),
                    "handler panicked"
                );
                if !token.is_empty() {
                    self.writer
                        .send(Response::failure(
                            token,
                            format!("broker: panic in method {method:?}"),
                        ))
                        .await;
                }
            } else {
                warn!(method = %method, "handler task cancelled");
            }
        }
    }

    /// Instantiate and run the handler for an already-resolved request,
    /// then emit its response.
    async fn invoke(self: Arc<Self>, req: Request) {
        let Some(factory) = self.registry.lookup(&req.method) else {
            // Checked before dispatch; the registry is immutable after
            // startup so this cannot happen.
            return;
        };

        let fut = match factory(self.ctx.clone(), req.body.as_deref()) {
            Ok(fut) => fut,
            Err(err) => {
                warn!(method = %req.method, %err, "cannot decode request body");
                if !req.token.is_empty() {
                    self.writer
                        .send(Response::failure(req.token, err.to_string()))
                        .await;
                }
                return;
            }
        };

        let outcome = fut.await;
        if req.token.is_empty() {
            // Fire-and-forget: nothing to reply to, but a failure is still
            // worth a log line.
            if !outcome.error.is_empty() {
                warn!(method = %req.method, error = %outcome.error, "fire-and-forget handler failed");
            }
            return;
        }

        self.writer
            .send(Response {
                token: req.token,
                error: outcome.error,
                tag: String::new(),
                data: outcome.data,
            })
            .await;
    }
}

/// Extract a human-readable message from a panicked task's payload.
fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_owned()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_owned()
            }
        }
        Err(err) => err.to_string(),
    }
}
