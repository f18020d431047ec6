//! Broker configuration and validation.

use std::time::Duration;

/// Default number of concurrent workers executing handler logic.
pub const DEFAULT_WORKERS: usize = 20;

/// Default depth of the queue between the reader and the worker pool.
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

/// Default dedup-cache capacity shared by cacheable handlers.
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Default idle TTL for dedup-cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between idle-cache sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Runtime tunables for one broker instance.
///
/// Transport endpoints are fixed to the process's standard input/output;
/// everything else is adjustable from the command line.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Maximum number of handlers executing concurrently.
    pub workers: usize,
    /// Capacity of the reader-to-workers queue. A full queue blocks the
    /// reader, throttling how fast requests are pulled off the wire.
    pub queue_depth: usize,
    /// Instance identifier echoed in every response `tag` field, letting a
    /// client distinguish which broker produced a response when several
    /// share a transport multiplexer.
    pub tag: String,
    /// Heartbeat interval for unsolicited poll responses; `None` disables
    /// the heartbeat.
    pub heartbeat: Option<Duration>,
    /// Emit the startup and shutdown notices.
    pub decorate: bool,
    /// Wait for outstanding handlers (which may hang forever) when the
    /// accept loop ends.
    pub wait: bool,
    /// Process the provided input once and exit instead of retrying reads
    /// when the stream reports end-of-file.
    pub single_shot: bool,
    /// Dedup-cache capacity.
    pub cache_capacity: usize,
    /// Dedup-cache idle TTL.
    pub cache_ttl: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            tag: String::new(),
            heartbeat: None,
            decorate: true,
            wait: false,
            single_shot: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl BrokerConfig {
    /// Validate the tunables.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AppError::Config`] when the worker count or queue
    /// depth is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.workers == 0 {
            return Err(crate::AppError::Config("worker count must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(crate::AppError::Config("queue depth must be at least 1".into()));
        }
        Ok(())
    }
}
