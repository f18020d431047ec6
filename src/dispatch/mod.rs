//! Handler dispatch: the `Caller` contract and its method registry.
//!
//! A handler is any type that can be deserialized from a request body and
//! invoked to produce `(data, error-string)`. Handlers are registered by
//! name at startup; the broker resolves the method name, builds a fresh
//! handler instance per request, and runs it on a worker.

pub mod registry;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::cache::MemoCache;
use crate::procs::ProcessRegistry;
use crate::proto::empty_data;

pub use registry::MethodRegistry;

/// Result of one handler invocation.
///
/// There is no other failure side-channel: `error` is the empty string on
/// success and the verbatim error text otherwise. A partially meaningful
/// payload may accompany a non-empty error.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Handler payload delivered in the response `data` field.
    pub data: Value,
    /// Empty on success.
    pub error: String,
}

impl CallOutcome {
    /// Successful outcome carrying `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            error: String::new(),
        }
    }

    /// Failed outcome with no meaningful payload.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            data: empty_data(),
            error: error.into(),
        }
    }
}

/// Lifecycle-scoped services handed to every handler invocation.
///
/// Constructed once at process start and cloned per call; everything inside
/// is shared by `Arc` so tests can build isolated instances instead of
/// relying on ambient globals.
#[derive(Clone)]
pub struct CallContext {
    /// Registry of cancellable external processes.
    pub procs: Arc<ProcessRegistry>,
    /// Shared dedup/result cache for handlers whose output is a pure
    /// function of their input.
    pub cache: Arc<MemoCache<CallOutcome>>,
}

impl CallContext {
    /// Build a context over the given shared services.
    #[must_use]
    pub fn new(procs: Arc<ProcessRegistry>, cache: Arc<MemoCache<CallOutcome>>) -> Self {
        Self { procs, cache }
    }
}

/// The capability contract implemented by every handler.
///
/// A handler type is populated by deserializing the request body into it,
/// then invoked exactly once. Instances are never reused across requests.
pub trait Caller: serde::de::DeserializeOwned + Send + 'static {
    /// Execute the handler.
    ///
    /// Implementations report failure exclusively through
    /// [`CallOutcome::error`]; panics are caught at the worker boundary and
    /// converted to a generic error response.
    fn call(self, ctx: CallContext) -> BoxFuture<'static, CallOutcome>;
}
