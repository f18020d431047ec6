//! Request-driven cancellation of tracked processes.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::dispatch::{CallContext, CallOutcome, Caller};

/// Terminates the tracked process registered under the given cancellation
/// id.
///
/// Responds with `{<cid>: <bool>}`, reporting whether a process was found
/// and signalled. Termination is best-effort: the launcher keeps ownership
/// of the child and reaps it itself.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Kill {
    /// Cancellation id previously embedded in some other response.
    #[serde(alias = "Cid")]
    pub cid: String,
}

impl Caller for Kill {
    fn call(self, ctx: CallContext) -> BoxFuture<'static, CallOutcome> {
        Box::pin(async move {
            let killed = ctx.procs.kill(&self.cid);
            let mut data = Map::new();
            data.insert(self.cid, Value::Bool(killed));
            CallOutcome::ok(Value::Object(data))
        })
    }
}
