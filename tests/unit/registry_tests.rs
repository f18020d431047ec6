//! Unit tests for the method registry and the `Caller` factory contract.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::json;

use toolbus::cache::MemoCache;
use toolbus::dispatch::{CallContext, CallOutcome, Caller, MethodRegistry};
use toolbus::methods::echo::Echo;
use toolbus::procs::ProcessRegistry;

fn test_ctx() -> CallContext {
    CallContext::new(
        Arc::new(ProcessRegistry::new()),
        Arc::new(MemoCache::new("test", 16, Duration::from_secs(60))),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Greet {
    name: String,
}

impl Caller for Greet {
    fn call(self, _ctx: CallContext) -> BoxFuture<'static, CallOutcome> {
        Box::pin(async move { CallOutcome::ok(json!({ "greeting": format!("hi {}", self.name) })) })
    }
}

/// Lookup resolves registered names and rejects unknown ones.
#[test]
fn lookup_resolves_registered_methods() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("greet");

    assert!(registry.lookup("greet").is_some());
    assert!(registry.lookup("nope").is_none());
    assert_eq!(registry.len(), 1);
    assert!(!registry.is_empty());
}

/// `names` returns the sorted list used in "invalid method" errors.
#[test]
fn names_are_sorted() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("zeta");
    registry.register::<Echo>("alpha");
    registry.register::<Echo>("mid");

    assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
}

/// Registering the same name twice is a programmer error and fails fast.
#[test]
#[should_panic(expected = "already registered")]
fn duplicate_registration_panics() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("greet");
    registry.register::<Greet>("greet");
}

/// Registering without a name is a programmer error and fails fast.
#[test]
#[should_panic(expected = "without a name")]
fn empty_name_registration_panics() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("");
}

/// The factory builds a fresh handler per call by deserializing the body.
#[tokio::test]
async fn factory_populates_handler_from_body() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("greet");

    let factory = registry.lookup("greet").expect("registered");
    let body = RawValue::from_string(r#"{"name":"ada"}"#.to_owned()).expect("raw value");

    let fut = factory(test_ctx(), Some(&body)).expect("factory must accept a valid body");
    let outcome = fut.await;

    assert!(outcome.error.is_empty());
    assert_eq!(outcome.data, json!({ "greeting": "hi ada" }));
}

/// A missing body is treated as the empty object so defaulted handlers
/// still run.
#[tokio::test]
async fn factory_defaults_missing_body() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("greet");

    let factory = registry.lookup("greet").expect("registered");
    let outcome = factory(test_ctx(), None).expect("missing body must default").await;

    assert_eq!(outcome.data, json!({ "greeting": "hi " }));
}

/// A body that does not match the handler schema is a dispatch error, not
/// a panic.
#[test]
fn factory_rejects_malformed_body() {
    let mut registry = MethodRegistry::new();
    registry.register::<Greet>("greet");

    let factory = registry.lookup("greet").expect("registered");
    let body = RawValue::from_string(r#"{"name":42}"#.to_owned()).expect("raw value");

    assert!(factory(test_ctx(), Some(&body)).is_err());
}
