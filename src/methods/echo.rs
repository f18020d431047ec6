//! No-op passthrough handler.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::{CallContext, CallOutcome, Caller};

/// Returns its request body verbatim as the response payload.
///
/// Clients use it as a round-trip liveness probe; the test suite uses it
/// as the minimal well-behaved handler.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Echo {
    body: Value,
}

impl Caller for Echo {
    fn call(self, _ctx: CallContext) -> BoxFuture<'static, CallOutcome> {
        Box::pin(async move { CallOutcome::ok(self.body) })
    }
}
