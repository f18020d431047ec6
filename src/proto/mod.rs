//! Wire-level request and response envelopes.
//!
//! Both directions of the protocol are newline-delimited JSON objects.
//! Requests carry `{method, token, body}`; responses carry
//! `{token, error, tag, data}`. The token is caller-chosen and echoed back
//! unchanged; an empty token means no reply is expected.

pub mod codec;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Prefix reserved for tokens on unsolicited responses (heartbeats and
/// lifecycle notices). Clients must not issue request tokens with this
/// prefix.
pub const RESERVED_TOKEN_PREFIX: &str = "toolbus.";

/// Token on the unsolicited startup notice.
pub const HELLO_TOKEN: &str = "toolbus.hello";

/// Token on periodic heartbeat responses.
pub const POLL_TOKEN: &str = "toolbus.poll";

/// Token on the unsolicited shutdown notice.
pub const BYE_TOKEN: &str = "toolbus.bye";

/// One inbound request envelope, parsed from a single input line.
///
/// Every field is defaulted so that a partial envelope still parses; the
/// broker decides how to report the missing pieces. `body` stays raw until
/// the method has been resolved to a handler type.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Request {
    /// Name of the registered handler to invoke.
    pub method: String,
    /// Caller-chosen correlation id, echoed back unchanged.
    pub token: String,
    /// Handler-specific payload, deserialized after method resolution.
    pub body: Option<Box<RawValue>>,
}

/// One outbound response envelope, serialized onto a single output line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Token of the request this answers, or a reserved token for
    /// unsolicited responses.
    pub token: String,
    /// Empty on success; handler or broker error text otherwise.
    pub error: String,
    /// Broker instance identifier; filled in by the writer when empty.
    pub tag: String,
    /// Handler payload. Never `null` on the wire: the writer substitutes
    /// an empty object so the client-side schema stays stable.
    pub data: Value,
}

impl Response {
    /// Build a successful response carrying `data`.
    #[must_use]
    pub fn ok(token: impl Into<String>, data: Value) -> Self {
        Self {
            token: token.into(),
            error: String::new(),
            tag: String::new(),
            data,
        }
    }

    /// Build an error response for `token`.
    #[must_use]
    pub fn failure(token: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            error: error.into(),
            tag: String::new(),
            data: Value::Null,
        }
    }

    /// Build a token-less error response, used for transport-level
    /// failures where no request token is known.
    #[must_use]
    pub fn transport_error(error: impl Into<String>) -> Self {
        Self::failure(String::new(), error)
    }
}

/// The canonical empty-object sentinel written in place of `null` data.
#[must_use]
pub fn empty_data() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Try to salvage the `token` field from a record that failed envelope
/// parsing, so the client blocked on it can still be answered.
///
/// Returns `None` when the record is not JSON at all or carries no
/// non-empty string token.
#[must_use]
pub fn salvage_token(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    match value.get("token") {
        Some(Value::String(token)) if !token.is_empty() => Some(token.clone()),
        _ => None,
    }
}
