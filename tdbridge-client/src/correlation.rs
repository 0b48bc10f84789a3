//! The correlation registry — a futures table matching asynchronous completion
//! events back to the operation that caused them.
//!
//! Every mutating operation returns an optimistic acknowledgement carrying an
//! echoed identifier; the real outcome arrives later as an unordered event.
//! A facade operation registers a [`WaitKey`] derived from the acknowledgement,
//! suspends on the returned receiver, and the event driver resolves it exactly
//! once when the matching event shows up.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::errors::{InvocationError, RpcError};
use crate::transport::TdObject;

// ─── WaitKey ──────────────────────────────────────────────────────────────────

/// Correlation key for one outstanding operation.
///
/// Keys must disambiguate by the narrowest scope the completion event carries:
/// send acknowledgements echo a provisional message id that is only unique per
/// chat, file transfers complete under a globally unique file id. Any new
/// operation type must establish an equivalently unique key before registering
/// a wait — a collision hands one caller another caller's result.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// A sent/forwarded message awaiting its success/failure event.
    MessageAck { chat_id: i64, echo_id: i64 },
    /// A file download awaiting its completion event.
    FileReady { file_id: i64 },
}

impl std::fmt::Display for WaitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MessageAck { chat_id, echo_id } => write!(f, "msg({chat_id},{echo_id})"),
            Self::FileReady { file_id }           => write!(f, "file({file_id})"),
        }
    }
}

/// Terminal outcome delivered to a waiter.
pub type Outcome = Result<TdObject, RpcError>;

// ─── Correlations ─────────────────────────────────────────────────────────────

/// Registry of outstanding waits.
///
/// Mutated concurrently by in-flight facade operations and by the single event
/// driver; every entry is removed the instant it is resolved or failed, so the
/// map never grows past the number of operations currently in flight.
#[derive(Default)]
pub struct Correlations {
    waits: Mutex<HashMap<WaitKey, oneshot::Sender<Outcome>>>,
}

impl Correlations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait under `key` and return the receiver to suspend on.
    ///
    /// A key that is already registered and not yet terminal is a caller
    /// contract violation and fails immediately.
    pub async fn register(&self, key: WaitKey) -> Result<oneshot::Receiver<Outcome>, InvocationError> {
        let mut waits = self.waits.lock().await;
        if waits.contains_key(&key) {
            return Err(InvocationError::DuplicateWait(key.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        waits.insert(key, tx);
        Ok(rx)
    }

    /// Deliver the terminal outcome for `key`.
    ///
    /// Resolves and removes the matching wait. An unknown key (nobody waiting,
    /// stale duplicate, or a wait that already timed out) is a silent no-op —
    /// this path runs on the shared event stream and must never fail or block.
    /// Returns whether a waiter was found.
    pub async fn deliver(&self, key: &WaitKey, outcome: Outcome) -> bool {
        let tx = self.waits.lock().await.remove(key);
        match tx {
            Some(tx) => {
                // A receiver dropped mid-wait just discards the outcome.
                let _ = tx.send(outcome);
                true
            }
            None => {
                log::debug!("[tdbridge] no waiter for {key}, event dropped");
                false
            }
        }
    }

    /// Suspend on a registered wait until delivery, or until `deadline` if set.
    ///
    /// On timeout the wait is unregistered *before* failing the caller, so a
    /// late event falls into the no-waiter branch of [`Correlations::deliver`].
    pub async fn wait(
        &self,
        key: WaitKey,
        rx: oneshot::Receiver<Outcome>,
        deadline: Option<Duration>,
    ) -> Result<TdObject, InvocationError> {
        let received = match deadline {
            None => rx.await,
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(r) => r,
                Err(_) => {
                    self.waits.lock().await.remove(&key);
                    log::warn!("[tdbridge] wait for {key} timed out after {d:?}");
                    return Err(InvocationError::Timeout);
                }
            },
        };
        match received {
            Ok(Ok(obj)) => Ok(obj),
            Ok(Err(e))  => Err(InvocationError::Rpc(e)),
            Err(_)      => Err(InvocationError::Dropped),
        }
    }

    /// Drop a wait without resolving it (the caller is abandoning it, e.g.
    /// because the request it was registered for failed to issue).
    pub async fn unregister(&self, key: &WaitKey) {
        self.waits.lock().await.remove(key);
    }

    /// Number of outstanding waits. Diagnostic.
    pub async fn outstanding(&self) -> usize {
        self.waits.lock().await.len()
    }

    /// Whether `key` is currently registered. Diagnostic.
    pub async fn contains(&self, key: &WaitKey) -> bool {
        self.waits.lock().await.contains_key(key)
    }
}
