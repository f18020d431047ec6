//! Request de-duplication and result caching.
//!
//! Generic pattern composed by any handler whose output is a pure function
//! of its input and is expensive to recompute: identical concurrent
//! requests are coalesced into a single execution (single-flight), and
//! completed results are kept in a bounded LRU that is additionally swept
//! for idle entries on a timer. Both eviction forces matter: capacity
//! bounds memory under many distinct inputs, and the idle sweep stops the
//! broker from serving results for content that has since changed on disk.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Content at or below this size is used verbatim as the cache key;
/// larger content is reduced to a digest so the key space does not pin
/// large buffers in memory.
pub const INLINE_KEY_MAX: usize = 32 * 1024;

/// Cache key derived from a handler's semantically relevant input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Small input, kept verbatim.
    Inline(String),
    /// Large input, reduced to a 64-bit hash plus length plus a stable
    /// secondary identifier so hash collisions across different inputs
    /// cannot alias.
    Digest {
        /// Stable secondary identifier, typically a file name.
        ident: String,
        /// Input length in bytes.
        len: usize,
        /// 64-bit mixing hash of the input.
        hash: u64,
    },
}

impl Fingerprint {
    /// Fingerprint `content`, with `ident` as the collision-breaking
    /// secondary identifier for large inputs.
    #[must_use]
    pub fn of(ident: &str, content: &str) -> Self {
        if content.len() <= INLINE_KEY_MAX {
            return Self::Inline(content.to_owned());
        }
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Self::Digest {
            ident: ident.to_owned(),
            len: content.len(),
            hash: hasher.finish(),
        }
    }
}

/// Result of one underlying computation, as handed to the cache.
#[derive(Debug, Clone)]
pub struct Flight<V> {
    /// The computed value, delivered to every coalesced caller.
    pub value: V,
    /// When set the value is delivered but never stored, for results
    /// whose correctness depends on side information the fingerprint does
    /// not capture.
    pub no_store: bool,
}

impl<V> Flight<V> {
    /// A storable result.
    #[must_use]
    pub fn store(value: V) -> Self {
        Self {
            value,
            no_store: false,
        }
    }

    /// A result delivered to callers but kept out of the cache.
    #[must_use]
    pub fn transient(value: V) -> Self {
        Self {
            value,
            no_store: true,
        }
    }
}

struct Entry<V> {
    value: V,
    last_access: Instant,
}

struct Inner<V> {
    entries: LruCache<Fingerprint, Entry<V>>,
    inflight: HashMap<Fingerprint, Arc<OnceCell<Flight<V>>>>,
}

/// Bounded, time-decayed, single-flight result cache.
pub struct MemoCache<V> {
    name: &'static str,
    ttl: Duration,
    inner: Mutex<Inner<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> MemoCache<V> {
    /// Create a cache holding at most `capacity` entries, with idle
    /// entries evicted once untouched for `ttl`.
    #[must_use]
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            ttl,
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                inflight: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, or run `compute` to produce it.
    ///
    /// N concurrent callers with the same fingerprint result in exactly one
    /// execution of `compute`; every caller receives a clone of the same
    /// result. A hit refreshes the entry's recency and last-access time.
    pub async fn get_or_compute<F>(&self, key: Fingerprint, compute: F) -> V
    where
        F: std::future::Future<Output = Flight<V>> + Send,
    {
        // Fast path plus inflight registration under one lock acquisition.
        // The guard is dropped before any await point.
        let cell = {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_access = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return entry.value.clone();
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            Arc::clone(
                inner
                    .inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        // Exactly one caller's compute future runs; the rest await it and
        // drop their own future unexecuted.
        let flight = cell.get_or_init(|| compute).await;
        let value = flight.value.clone();

        let mut inner = self.lock();
        if inner.inflight.remove(&key).is_some() && !flight.no_store {
            inner.entries.put(
                key,
                Entry {
                    value: value.clone(),
                    last_access: Instant::now(),
                },
            );
        }
        value
    }

    /// Look up `key`, refreshing its recency on a hit.
    #[must_use]
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = Instant::now();
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value.clone())
    }

    /// Insert `value` under `key`, evicting the least-recently-used entry
    /// if the cache is at capacity.
    pub fn insert(&self, key: Fingerprint, value: V) {
        self.lock().entries.put(
            key,
            Entry {
                value,
                last_access: Instant::now(),
            },
        );
    }

    /// Whether `key` is cached, without touching its recency.
    #[must_use]
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.lock().entries.peek(key).is_some()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Evict every entry whose last access is older than the TTL,
    /// returning how many were removed. Runs independently of capacity
    /// pressure.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired: Vec<Fingerprint> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_access) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }

        if !expired.is_empty() {
            debug!(
                cache = self.name,
                evicted = expired.len(),
                remaining = inner.entries.len(),
                hits = self.hits.load(Ordering::Relaxed),
                misses = self.misses.load(Ordering::Relaxed),
                "idle sweep"
            );
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Spawn the background idle sweep for `cache`, running every `interval`
/// until the cancellation token fires.
#[must_use]
pub fn spawn_sweep_task<V: Clone + Send + Sync + 'static>(
    cache: Arc<MemoCache<V>>,
    interval: Duration,
    ct: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = ct.cancelled() => {
                    info!(cache = cache.name, "sweep task shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {
                    cache.sweep();
                }
            }
        }
    })
}
