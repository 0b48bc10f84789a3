//! The transport seam.
//!
//! The real client process talks to a TDLib-style executor that accepts named
//! operations and pushes completion/update events back on its own schedule.
//! Everything here is the fixed contract of that collaborator; the crate never
//! looks inside payload variants beyond the fields the correlation layer needs.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::RpcError;

// ─── TdObject ─────────────────────────────────────────────────────────────────

/// A discriminant-tagged object returned by the transport or pushed as an event.
///
/// Serializes to the transport's wire shape: the discriminant under `@type`,
/// payload fields inline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TdObject {
    /// Discriminant naming the payload shape (e.g. `"message"`, `"updateFile"`).
    #[serde(rename = "@type")]
    pub kind: String,
    /// The payload fields, untouched by this crate.
    #[serde(flatten)]
    pub data: Value,
}

impl TdObject {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self { kind: kind.into(), data }
    }

    /// The sentinel success object for operations with no payload.
    pub fn ok() -> Self {
        Self { kind: "ok".into(), data: Value::Object(Default::default()) }
    }

    /// Fetch an integer field from the payload, accepting both JSON numbers
    /// and stringified 64-bit values (the transport uses strings for ids that
    /// overflow double precision).
    pub fn int_field(&self, name: &str) -> Option<i64> {
        int_of(&self.data, name)
    }
}

pub(crate) fn int_of(value: &Value, name: &str) -> Option<i64> {
    match &value[name] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Boxed future returned by [`Transport::invoke`].
pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<TdObject, RpcError>> + Send + 'a>>;

// ─── Transport ────────────────────────────────────────────────────────────────

/// Executor of named remote operations.
///
/// `invoke` resolves with the transport's *immediate* outcome — for mutating
/// operations that is an optimistic acknowledgement; the real result arrives
/// later on the event stream and is matched back by the correlation registry.
pub trait Transport: Send + Sync + 'static {
    fn invoke(&self, method: &str, params: Value) -> InvokeFuture<'_>;
}

// ─── Event stream ─────────────────────────────────────────────────────────────

/// Sending half handed to the transport; it publishes events in arrival order.
pub type EventSender = mpsc::UnboundedSender<TdObject>;

/// Receiving half consumed by the client's driver task, strictly one event at
/// a time.
pub type EventReceiver = mpsc::UnboundedReceiver<TdObject>;

/// Create the event channel connecting a transport to [`crate::Client::connect`].
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
