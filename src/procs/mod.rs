//! Registry of cancellable external processes.
//!
//! Handlers that spawn externally visible work register the child here
//! under a caller-supplied id so a later `kill` request (or process
//! shutdown) can terminate it. Killing is a best-effort, fire-and-forget
//! signal: the registry never waits on or reaps a child. That stays with
//! whoever launched it, since the launcher is presumably blocked on the
//! process and will collect its exit status itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tracing::{debug, warn};

/// Terminate capability over one tracked unit of work.
///
/// The registry stores handles as this trait so tests can substitute
/// counting doubles, and so non-process work (a worker thread, a remote
/// job) can be tracked the same way.
pub trait ProcHandle: Send + Sync {
    /// Deliver a best-effort terminate signal without waiting for exit.
    ///
    /// Returns whether the signal was delivered. Must not block.
    fn terminate(&self) -> bool;
}

/// Terminate capability backed by an OS process id.
#[derive(Debug, Clone, Copy)]
pub struct PidHandle {
    pid: i32,
}

impl PidHandle {
    /// Wrap a raw process id.
    #[must_use]
    pub fn new(pid: i32) -> Self {
        Self { pid }
    }
}

#[cfg(unix)]
impl ProcHandle for PidHandle {
    fn terminate(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(self.pid), Signal::SIGTERM) {
            Ok(()) => true,
            Err(err) => {
                warn!(pid = self.pid, %err, "failed to signal process");
                false
            }
        }
    }
}

#[cfg(not(unix))]
impl ProcHandle for PidHandle {
    fn terminate(&self) -> bool {
        warn!(pid = self.pid, "process signalling is not supported on this platform");
        false
    }
}

/// Concurrent map from cancellation id to a live process handle.
///
/// All operations share one coarse lock; every critical section is an O(1)
/// map operation, never the potentially slow signalling itself.
#[derive(Default)]
pub struct ProcessRegistry {
    inner: Mutex<HashMap<String, Arc<dyn ProcHandle>>>,
    next_id: AtomicU64,
}

impl ProcessRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a registry-unique id for a launcher that has no natural one.
    pub fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Track `handle` under `id`.
    ///
    /// Returns `false` without overwriting when `id` is empty or already
    /// registered; the launcher must then pick a different id or treat the
    /// launch as failed-to-track.
    pub fn register(&self, id: &str, handle: Arc<dyn ProcHandle>) -> bool {
        if id.is_empty() {
            return false;
        }
        let mut map = lock_poisoned_ok(&self.inner);
        if map.contains_key(id) {
            return false;
        }
        map.insert(id.to_owned(), handle);
        debug!(id, "process registered");
        true
    }

    /// Stop tracking `id`, returning whether it was present.
    pub fn unregister(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        lock_poisoned_ok(&self.inner).remove(id).is_some()
    }

    /// Signal the process tracked under `id`, returning whether one was
    /// found.
    ///
    /// The entry is deliberately left in the registry: the launcher still
    /// owns the handle and removes it once it has reaped the child.
    pub fn kill(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let handle = lock_poisoned_ok(&self.inner).get(id).map(Arc::clone);
        match handle {
            Some(handle) => {
                handle.terminate();
                debug!(id, "kill signal sent");
                true
            }
            None => false,
        }
    }

    /// Signal every tracked process concurrently and wait for all signal
    /// attempts to complete. Used only at process shutdown.
    pub async fn kill_all(&self) {
        let handles: Vec<(String, Arc<dyn ProcHandle>)> = lock_poisoned_ok(&self.inner)
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();

        if handles.is_empty() {
            return;
        }
        debug!(count = handles.len(), "killing all tracked processes");

        let tasks = handles.into_iter().map(|(id, handle)| {
            tokio::task::spawn_blocking(move || {
                if !handle.terminate() {
                    warn!(id, "terminate signal was not delivered");
                }
            })
        });
        join_all(tasks).await;
    }

    /// Number of currently tracked processes.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_poisoned_ok(&self.inner).len()
    }

    /// Whether nothing is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock_poisoned_ok(&self.inner).is_empty()
    }
}

/// Take the lock even if a panicking thread poisoned it; the map itself is
/// always in a consistent state because every mutation is a single call.
fn lock_poisoned_ok<T>(lock: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
