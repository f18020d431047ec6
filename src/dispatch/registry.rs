//! Name-to-factory method registry.
//!
//! Populated during program initialization, then frozen behind an `Arc`
//! for the life of the process: lookups after startup never take a lock.
//! Registration mistakes are programmer errors and fail fast by panicking
//! rather than surfacing as recoverable runtime conditions.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use serde_json::value::RawValue;
use tracing::debug;

use super::{CallContext, CallOutcome, Caller};
use crate::Result;

/// Factory resolved from a method name: deserializes the raw request body
/// into a fresh handler instance and returns its invocation future.
pub type MethodFactory =
    Box<dyn Fn(CallContext, Option<&RawValue>) -> Result<BoxFuture<'static, CallOutcome>> + Send + Sync>;

/// Append-only mapping from method name to handler factory.
#[derive(Default)]
pub struct MethodRegistry {
    methods: BTreeMap<&'static str, MethodFactory>,
}

impl MethodRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler type `C` under `name`.
    ///
    /// A missing body is treated as the empty object, so handlers lean on
    /// `#[serde(default)]` for optional fields.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or already registered. Registration runs
    /// only during startup, so this aborts the process before it ever
    /// serves a request; a duplicate name indicates a build defect.
    pub fn register<C: Caller>(&mut self, name: &'static str) {
        assert!(!name.is_empty(), "cannot register a method without a name");
        assert!(
            !self.methods.contains_key(name),
            "method {name} is already registered"
        );

        let factory: MethodFactory = Box::new(|ctx, body| {
            let raw = body.map_or("{}", RawValue::get);
            let handler: C = serde_json::from_str(raw)?;
            Ok(handler.call(ctx))
        });
        self.methods.insert(name, factory);
        debug!(method = name, "registered method");
    }

    /// Resolve `name` to its factory.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&MethodFactory> {
        self.methods.get(name)
    }

    /// Sorted list of registered method names, used to build the
    /// "invalid method" error message.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        // BTreeMap iteration order is already sorted.
        self.methods.keys().copied().collect()
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether no methods have been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
