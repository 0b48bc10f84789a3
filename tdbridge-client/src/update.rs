//! High-level update types delivered by [`crate::Client::next_update`], and the
//! driver-side routing that feeds the correlation registry.
//!
//! Events arrive on a single serialized stream. The driver consumes them one
//! at a time: completion events are matched into the registry, everything else
//! is classified into an [`Update`] variant (with [`Update::Raw`] as the
//! fallback for anything not yet wrapped). Nothing on this path may fail in a
//! way that halts event processing.

use std::sync::atomic::Ordering;

use serde_json::Value;

use crate::correlation::WaitKey;
use crate::errors::{InvocationError, RpcError};
use crate::msg_id;
use crate::transport::{int_of, TdObject};
use crate::ClientInner;

// ─── Message ──────────────────────────────────────────────────────────────────

/// A message as surfaced to callers: ids already transcoded to the public
/// numbering, raw payload kept alongside.
#[derive(Clone, Debug)]
pub struct Message {
    /// Public message id.
    pub id: i64,
    pub chat_id: i64,
    /// The untouched transport payload.
    pub raw: Value,
}

impl Message {
    /// Wrap a transport-side message object, transcoding its id outward.
    ///
    /// A payload missing either identifying field is malformed and surfaced as
    /// such rather than smoothed over with a fabricated id.
    pub(crate) fn from_internal(raw: Value) -> Result<Self, InvocationError> {
        let id = int_of(&raw, "id")
            .map(msg_id::to_external)
            .ok_or_else(|| InvocationError::Deserialize("message without id".into()))?;
        let chat_id = int_of(&raw, "chat_id")
            .ok_or_else(|| InvocationError::Deserialize("message without chat_id".into()))?;
        Ok(Self { id, chat_id, raw })
    }

    /// The message text, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        self.raw["content"]["text"]["text"].as_str()
    }
}

// ─── File ─────────────────────────────────────────────────────────────────────

/// A file whose local copy is complete, as returned by
/// [`crate::Client::download_file`].
#[derive(Clone, Debug)]
pub struct File {
    pub id: i64,
    /// Path of the downloaded local copy.
    pub path: String,
    pub raw: Value,
}

impl File {
    pub(crate) fn from_internal(raw: Value) -> Self {
        let id = int_of(&raw, "id").unwrap_or(0);
        let path = raw["local"]["path"].as_str().unwrap_or_default().to_string();
        Self { id, path, raw }
    }

    pub(crate) fn is_complete(raw: &Value) -> bool {
        raw["local"]["is_downloading_completed"].as_bool().unwrap_or(false)
    }
}

// ─── CallbackQuery ────────────────────────────────────────────────────────────

/// A user pressed an interactive button on one of our messages.
///
/// `payload` is the decrypted token plaintext; queries whose token fails to
/// decrypt are dropped at the boundary and never reach the caller.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub query_id: i64,
    pub sender_user_id: i64,
    pub chat_id: i64,
    /// Public id of the message the button was attached to.
    pub message_id: i64,
    pub payload: Vec<u8>,
}

impl CallbackQuery {
    /// Payload as a UTF-8 string, if valid.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// Updates forwarded to the caller after the driver has taken its share.
#[derive(Clone, Debug)]
pub enum Update {
    /// A new inbound message.
    NewMessage(Message),
    /// A message's content or markup changed.
    MessageEdited { chat_id: i64, message_id: i64 },
    /// An interactive button press with a successfully decrypted payload.
    CallbackQuery(CallbackQuery),
    /// Anything this crate does not classify.
    Raw(TdObject),
}

// ─── Driver-side routing ──────────────────────────────────────────────────────

/// Process one inbound event. Called by the driver task, strictly serially.
pub(crate) async fn process_event(inner: &ClientInner, event: TdObject) {
    match event.kind.as_str() {
        "updateAuthorizationState" => {
            if event.data["authorization_state"]["@type"] == "authorizationStateReady" {
                inner.ready.store(true, Ordering::Release);
                log::info!("[tdbridge] session ready");
            }
        }

        "updateMessageSendSucceeded" => {
            let message = event.data["message"].clone();
            match (int_of(&message, "chat_id"), event.int_field("old_message_id")) {
                (Some(chat_id), Some(echo_id)) => {
                    let key = WaitKey::MessageAck { chat_id, echo_id };
                    inner.correlations.deliver(&key, Ok(TdObject::new("message", message))).await;
                }
                _ => log::warn!("[tdbridge] send-succeeded event without ids, dropped"),
            }
        }

        "updateMessageSendFailed" => {
            let message = &event.data["message"];
            match (int_of(message, "chat_id"), event.int_field("old_message_id")) {
                (Some(chat_id), Some(echo_id)) => {
                    let key = WaitKey::MessageAck { chat_id, echo_id };
                    inner.correlations.deliver(&key, Err(send_failure(&event.data))).await;
                }
                _ => log::warn!("[tdbridge] send-failed event without ids, dropped"),
            }
        }

        "updateFile" => {
            let file = &event.data["file"];
            if File::is_complete(file) {
                if let Some(file_id) = int_of(file, "id") {
                    let key = WaitKey::FileReady { file_id };
                    inner
                        .correlations
                        .deliver(&key, Ok(TdObject::new("file", file.clone())))
                        .await;
                }
            }
            // Progress events carry no terminal outcome; nothing to correlate.
        }

        "updateNewCallbackQuery" => {
            if let Some(q) = decode_callback_query(inner, &event.data) {
                let _ = inner.update_tx.send(Update::CallbackQuery(q));
            }
        }

        "updateNewMessage" => {
            match Message::from_internal(event.data["message"].clone()) {
                Ok(msg) => {
                    let _ = inner.update_tx.send(Update::NewMessage(msg));
                }
                Err(e) => {
                    log::warn!("[tdbridge] malformed inbound message ({e}), forwarded raw");
                    let _ = inner.update_tx.send(Update::Raw(event));
                }
            }
        }

        "updateMessageEdited" | "updateMessageContent" => {
            let chat_id = event.int_field("chat_id").unwrap_or(0);
            let message_id = event.int_field("message_id").map(msg_id::to_external).unwrap_or(0);
            let _ = inner.update_tx.send(Update::MessageEdited { chat_id, message_id });
        }

        _ => {
            let _ = inner.update_tx.send(Update::Raw(event));
        }
    }
}

/// Extract the failure carried by a send-failed event.
///
/// Newer transports nest an `error` object; older ones used flat
/// `error_code`/`error_message` fields. Accept both.
fn send_failure(data: &Value) -> RpcError {
    let err = &data["error"];
    if err.is_object() {
        RpcError::new(
            err["code"].as_i64().unwrap_or(0) as i32,
            err["message"].as_str().unwrap_or("send failed"),
        )
    } else {
        RpcError::new(
            data["error_code"].as_i64().unwrap_or(0) as i32,
            data["error_message"].as_str().unwrap_or("send failed"),
        )
    }
}

/// Decrypt and shape an inbound callback query.
///
/// Tokens come from untrusted clients replaying whatever we once issued (or
/// never issued); a token that fails to decrypt discards the event with a
/// warning rather than surfacing a fault on the event path.
fn decode_callback_query(inner: &ClientInner, data: &Value) -> Option<CallbackQuery> {
    let token = data["payload"]["data"].as_str()?;
    let payload = match inner.cipher.decrypt(token) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("[tdbridge] undecryptable callback payload ({e}), query dropped");
            return None;
        }
    };
    Some(CallbackQuery {
        query_id: int_of(data, "id").unwrap_or(0),
        sender_user_id: int_of(data, "sender_user_id").unwrap_or(0),
        chat_id: int_of(data, "chat_id").unwrap_or(0),
        message_id: int_of(data, "message_id").map(msg_id::to_external).unwrap_or(0),
        payload,
    })
}
