//! # tdbridge-client
//!
//! Awaitable request/response messaging on top of a push-based transport.
//!
//! The underlying executor acknowledges every mutating call optimistically and
//! reports the real outcome later as an independent, unordered event. This
//! crate makes those operations awaitable:
//! - Correlation registry: one wait per key, resolved exactly once, removed on
//!   fulfillment
//! - Username → chat-id cache with TTL
//! - Bit-for-bit chat-id kind encoding and lazy, idempotent chat preparation
//! - Public ↔ internal message-id transcoding at every boundary
//! - AES-256-CTR callback-token encryption (optional, per-session key)
//! - Send / forward / edit / delete messages, answer callbacks, download files
//! - Typed async update stream: `NewMessage`, `MessageEdited`, `CallbackQuery`, `Raw`

#![deny(unsafe_code)]

mod errors;
mod identity;

pub mod chats;
pub mod correlation;
pub mod msg_id;
pub mod transport;
pub mod update;

pub use errors::{InvocationError, RpcError};
pub use identity::DEFAULT_RESOLVE_TTL;
pub use tdbridge_crypto::{CipherError, TokenCipher, MAX_PLAINTEXT_LEN};
pub use transport::{event_channel, EventReceiver, EventSender, InvokeFuture, TdObject, Transport};
pub use update::{CallbackQuery, File, Message, Update};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

use chats::{ChatKind, InitializedChats};
use correlation::{Correlations, WaitKey};
use identity::UsernameCache;

// ─── InputMessage builder ─────────────────────────────────────────────────────

/// Builder for composing outgoing messages.
///
/// ```rust
/// use tdbridge_client::{Button, InputMessage};
///
/// let msg = InputMessage::text("Pick one")
///     .reply_to(Some(42))
///     .keyboard(vec![vec![Button::new("Next", b"page:2".to_vec())]]);
/// ```
#[derive(Clone, Default)]
pub struct InputMessage {
    pub text: String,
    /// Public id of the message being replied to.
    pub reply_to: Option<i64>,
    pub disable_notification: bool,
    /// Rows of interactive buttons; payloads run through the session cipher.
    pub keyboard: Option<Vec<Vec<Button>>>,
}

/// One interactive button. `payload` is the plaintext handed back in the
/// matching [`CallbackQuery`]; bounded by [`MAX_PLAINTEXT_LEN`].
#[derive(Clone)]
pub struct Button {
    pub text: String,
    pub payload: Vec<u8>,
}

impl Button {
    pub fn new(text: impl Into<String>, payload: Vec<u8>) -> Self {
        Self { text: text.into(), payload }
    }
}

impl InputMessage {
    /// Create a message with the given text.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    /// Reply to a specific public message id.
    pub fn reply_to(mut self, id: Option<i64>) -> Self {
        self.reply_to = id; self
    }

    /// Send silently (no notification sound).
    pub fn disable_notification(mut self, v: bool) -> Self {
        self.disable_notification = v; self
    }

    /// Attach an interactive keyboard.
    pub fn keyboard(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.keyboard = Some(rows); self
    }

    fn into_params(self, chat_id: i64, cipher: &TokenCipher) -> Result<Value, InvocationError> {
        let mut params = json!({
            "chat_id": chat_id,
            "options": {
                "@type": "messageSendOptions",
                "disable_notification": self.disable_notification,
            },
            "input_message_content": {
                "@type": "inputMessageText",
                "text": { "@type": "formattedText", "text": self.text },
            },
        });
        if let Some(id) = self.reply_to {
            params["reply_to_message_id"] = json!(msg_id::to_internal(id));
        }
        if let Some(rows) = &self.keyboard {
            params["reply_markup"] = keyboard_markup(rows, cipher)?;
        }
        Ok(params)
    }
}

impl From<&str> for InputMessage {
    fn from(s: &str) -> Self { Self::text(s) }
}

impl From<String> for InputMessage {
    fn from(s: String) -> Self { Self::text(s) }
}

/// Serialize keyboard rows, encrypting each button payload into a token.
fn keyboard_markup(rows: &[Vec<Button>], cipher: &TokenCipher) -> Result<Value, InvocationError> {
    let mut out_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut out_row = Vec::with_capacity(row.len());
        for b in row {
            let token = cipher.encrypt(&b.payload)?;
            out_row.push(json!({
                "@type": "inlineKeyboardButton",
                "text": b.text,
                "type": { "@type": "inlineKeyboardButtonTypeCallback", "data": token },
            }));
        }
        out_rows.push(Value::Array(out_row));
    }
    Ok(json!({ "@type": "replyMarkupInlineKeyboard", "rows": out_rows }))
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
#[derive(Clone)]
pub struct Config {
    /// Secret the callback-token key is derived from. `None` leaves tokens as
    /// plain base64 (default).
    pub callback_secret: Option<String>,
    /// Lifetime of username-resolution cache entries (default: 30 minutes).
    pub resolve_ttl: Duration,
    /// Bound on how long a registered wait may stay outstanding. `None` waits
    /// forever (default, matching the transport's own behavior); setting it
    /// bounds registry growth when completion events are lost.
    pub ack_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callback_secret: None,
            resolve_ttl: DEFAULT_RESOLVE_TTL,
            ack_timeout: None,
        }
    }
}

// ─── ClientInner ──────────────────────────────────────────────────────────────

pub(crate) struct ClientInner {
    transport: Arc<dyn Transport>,
    pub(crate) correlations: Correlations,
    pub(crate) usernames: Mutex<UsernameCache>,
    pub(crate) initialized: Mutex<InitializedChats>,
    pub(crate) cipher: TokenCipher,
    pub(crate) ready: AtomicBool,
    pub(crate) update_tx: mpsc::UnboundedSender<Update>,
    ack_timeout: Option<Duration>,
}

/// The client facade. Cheap to clone — internally Arc-wrapped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    update_rx: Arc<Mutex<mpsc::UnboundedReceiver<Update>>>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────────

    /// Attach to a transport and its event stream.
    ///
    /// Spawns the driver task that consumes `events` strictly one at a time,
    /// feeding the correlation registry and the update stream. Operations
    /// reject with [`InvocationError::NotReady`] until the transport reports
    /// its session ready on the event stream.
    pub fn connect(transport: Arc<dyn Transport>, mut events: EventReceiver, config: Config) -> Self {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(ClientInner {
            transport,
            correlations: Correlations::new(),
            usernames: Mutex::new(UsernameCache::new(config.resolve_ttl)),
            initialized: Mutex::new(InitializedChats::default()),
            cipher: TokenCipher::from_secret(config.callback_secret.as_deref()),
            ready: AtomicBool::new(false),
            update_tx,
            ack_timeout: config.ack_timeout,
        });

        let driver_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                update::process_event(&driver_inner, event).await;
            }
            log::info!("[tdbridge] event stream closed, driver exiting");
        });

        Self { inner, update_rx: Arc::new(Mutex::new(update_rx)) }
    }

    /// Wait for the next update. Returns `None` when the driver has exited.
    pub async fn next_update(&self) -> Option<Update> {
        self.update_rx.lock().await.recv().await
    }

    /// Number of operations currently awaiting a completion event. Diagnostic.
    pub async fn pending_waits(&self) -> usize {
        self.inner.correlations.outstanding().await
    }

    fn ensure_ready(&self) -> Result<(), InvocationError> {
        if self.inner.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(InvocationError::NotReady)
        }
    }

    // ── Raw invoke ─────────────────────────────────────────────────────────

    /// Invoke any named operation directly.
    pub async fn invoke(&self, method: &str, params: Value) -> Result<TdObject, InvocationError> {
        self.inner.transport.invoke(method, params).await.map_err(InvocationError::Rpc)
    }

    // ── Identity resolution ────────────────────────────────────────────────

    /// Resolve a chat handle (`"@name"`, `"name"`, or a numeric id string) to
    /// a chat id.
    ///
    /// Numeric input returns unchanged without touching cache or transport.
    /// Cached resolutions are reused within their TTL. A rate-limit failure
    /// from the lookup propagates verbatim so callers can back off; any other
    /// lookup failure is wrapped as [`InvocationError::Resolve`] and not cached.
    pub async fn resolve_chat(&self, chat: &str) -> Result<i64, InvocationError> {
        self.ensure_ready()?;
        if let Ok(id) = chat.trim().parse::<i64>() {
            return Ok(id);
        }
        let handle = UsernameCache::normalize(chat)
            .ok_or_else(|| InvocationError::Resolve(format!("empty handle {chat:?}")))?;

        if let Some(id) = self.inner.usernames.lock().await.get(&handle) {
            return Ok(id);
        }

        match self.invoke("searchPublicChat", json!({ "username": handle })).await {
            Ok(obj) => {
                let id = obj
                    .int_field("id")
                    .ok_or_else(|| InvocationError::Deserialize("chat without id".into()))?;
                self.inner.usernames.lock().await.insert(handle, id);
                Ok(id)
            }
            Err(InvocationError::Rpc(e)) if e.is_rate_limit() => Err(InvocationError::Rpc(e)),
            Err(InvocationError::Rpc(e)) => {
                Err(InvocationError::Resolve(format!("cannot resolve @{handle}: {e}")))
            }
            Err(e) => Err(e),
        }
    }

    // ── Chat preparation ───────────────────────────────────────────────────

    /// Lazily prepare a chat for use. Idempotent: once a chat is marked
    /// initialized, later calls return without any transport traffic.
    ///
    /// A cheap existence probe is tried first; if the transport does not know
    /// the chat yet, the kind-specific descriptor is fetched and the chat
    /// created. Failure leaves the chat unmarked so the next call retries the
    /// full sequence.
    pub async fn ensure_chat(&self, chat_id: i64) -> Result<(), InvocationError> {
        self.ensure_ready()?;
        if self.inner.initialized.lock().await.contains(chat_id) {
            return Ok(());
        }

        if self.invoke("getChat", json!({ "chat_id": chat_id })).await.is_err() {
            self.create_chat(chat_id).await?;
        }

        self.inner.initialized.lock().await.mark(chat_id);
        Ok(())
    }

    async fn create_chat(&self, chat_id: i64) -> Result<(), InvocationError> {
        match chats::classify(chat_id) {
            ChatKind::Private { user_id } => {
                self.invoke("getUser", json!({ "user_id": user_id })).await?;
                self.invoke("createPrivateChat", json!({ "user_id": user_id, "force": false }))
                    .await?;
            }
            ChatKind::Group { basic_group_id } => {
                self.invoke("getBasicGroup", json!({ "basic_group_id": basic_group_id })).await?;
                self.invoke(
                    "createBasicGroupChat",
                    json!({ "basic_group_id": basic_group_id, "force": false }),
                )
                .await?;
            }
            ChatKind::Channel { supergroup_id } => {
                self.invoke("getSupergroup", json!({ "supergroup_id": supergroup_id })).await?;
                self.invoke(
                    "createSupergroupChat",
                    json!({ "supergroup_id": supergroup_id, "force": false }),
                )
                .await?;
            }
        }
        log::debug!("[tdbridge] chat {chat_id} created");
        Ok(())
    }

    // ── Messaging ──────────────────────────────────────────────────────────

    /// Send a message and await its real outcome.
    ///
    /// The transport acknowledges with a provisional message carrying an
    /// echoed id; the returned future resolves when the matching
    /// success/failure event arrives (bounded by [`Config::ack_timeout`] if
    /// set).
    pub async fn send_message(
        &self,
        chat: &str,
        message: impl Into<InputMessage>,
    ) -> Result<Message, InvocationError> {
        self.ensure_ready()?;
        let chat_id = self.resolve_chat(chat).await?;
        self.ensure_chat(chat_id).await?;

        let params = message.into().into_params(chat_id, &self.inner.cipher)?;
        let ack = self.invoke("sendMessage", params).await?;
        self.await_send_ack(chat_id, ack).await
    }

    /// Forward a message and await the real outcome of the copy.
    pub async fn forward_message(
        &self,
        to_chat: &str,
        from_chat: &str,
        message_id: i64,
    ) -> Result<Message, InvocationError> {
        self.ensure_ready()?;
        let chat_id = self.resolve_chat(to_chat).await?;
        let from_chat_id = self.resolve_chat(from_chat).await?;
        self.ensure_chat(chat_id).await?;

        let ack = self
            .invoke(
                "forwardMessages",
                json!({
                    "chat_id": chat_id,
                    "from_chat_id": from_chat_id,
                    "message_ids": [msg_id::to_internal(message_id)],
                }),
            )
            .await?;
        let first = TdObject::new("message", ack.data["messages"][0].clone());
        self.await_send_ack(chat_id, first).await
    }

    /// Register the wait keyed by the acknowledgement's echoed id and suspend
    /// until the matching completion event is delivered.
    async fn await_send_ack(&self, chat_id: i64, ack: TdObject) -> Result<Message, InvocationError> {
        let echo_id = ack
            .int_field("id")
            .ok_or_else(|| InvocationError::Deserialize("ack without echoed id".into()))?;
        let key = WaitKey::MessageAck { chat_id, echo_id };
        let rx = self.inner.correlations.register(key.clone()).await?;
        let obj = self.inner.correlations.wait(key, rx, self.inner.ack_timeout).await?;
        Message::from_internal(obj.data)
    }

    /// Edit the text of a previously sent message.
    pub async fn edit_message_text(
        &self,
        chat: &str,
        message_id: i64,
        text: impl Into<String>,
    ) -> Result<Message, InvocationError> {
        self.ensure_ready()?;
        let chat_id = self.resolve_chat(chat).await?;
        let obj = self
            .invoke(
                "editMessageText",
                json!({
                    "chat_id": chat_id,
                    "message_id": msg_id::to_internal(message_id),
                    "input_message_content": {
                        "@type": "inputMessageText",
                        "text": { "@type": "formattedText", "text": text.into() },
                    },
                }),
            )
            .await?;
        Message::from_internal(obj.data)
    }

    /// Replace the interactive keyboard of a previously sent message.
    pub async fn edit_message_reply_markup(
        &self,
        chat: &str,
        message_id: i64,
        keyboard: Vec<Vec<Button>>,
    ) -> Result<Message, InvocationError> {
        self.ensure_ready()?;
        let chat_id = self.resolve_chat(chat).await?;
        let obj = self
            .invoke(
                "editMessageReplyMarkup",
                json!({
                    "chat_id": chat_id,
                    "message_id": msg_id::to_internal(message_id),
                    "reply_markup": keyboard_markup(&keyboard, &self.inner.cipher)?,
                }),
            )
            .await?;
        Message::from_internal(obj.data)
    }

    /// Delete messages by their public ids.
    pub async fn delete_messages(
        &self,
        chat: &str,
        message_ids: &[i64],
    ) -> Result<(), InvocationError> {
        self.ensure_ready()?;
        let chat_id = self.resolve_chat(chat).await?;
        let internal: Vec<i64> = message_ids.iter().copied().map(msg_id::to_internal).collect();
        let obj = self
            .invoke(
                "deleteMessages",
                json!({ "chat_id": chat_id, "message_ids": internal, "revoke": true }),
            )
            .await?;
        expect_ok(obj)
    }

    /// Answer an interactive button press (clears the client-side spinner).
    pub async fn answer_callback_query(
        &self,
        query_id: i64,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), InvocationError> {
        self.ensure_ready()?;
        let obj = self
            .invoke(
                "answerCallbackQuery",
                json!({
                    "callback_query_id": query_id,
                    "text": text.unwrap_or(""),
                    "show_alert": show_alert,
                }),
            )
            .await?;
        expect_ok(obj)
    }

    // ── Files ──────────────────────────────────────────────────────────────

    /// Download a file and await its local copy.
    ///
    /// File ids are globally unique, so the wait is registered *before* the
    /// request is issued — the completion event cannot race the registration.
    pub async fn download_file(&self, file_id: i64, priority: i32) -> Result<File, InvocationError> {
        self.ensure_ready()?;
        let key = WaitKey::FileReady { file_id };
        let rx = self.inner.correlations.register(key.clone()).await?;

        let ack = match self
            .invoke(
                "downloadFile",
                json!({
                    "file_id": file_id,
                    "priority": priority,
                    "offset": 0,
                    "limit": 0,
                    "synchronous": false,
                }),
            )
            .await
        {
            Ok(obj) => obj,
            Err(e) => {
                self.inner.correlations.unregister(&key).await;
                return Err(e);
            }
        };

        // Already on disk: no event will follow.
        if File::is_complete(&ack.data) {
            self.inner.correlations.unregister(&key).await;
            return Ok(File::from_internal(ack.data));
        }

        let obj = self.inner.correlations.wait(key, rx, self.inner.ack_timeout).await?;
        Ok(File::from_internal(obj.data))
    }

    // ── Self ───────────────────────────────────────────────────────────────

    /// Fetch the authorized account's own descriptor.
    pub async fn get_me(&self) -> Result<TdObject, InvocationError> {
        self.ensure_ready()?;
        self.invoke("getMe", json!({})).await
    }
}

fn expect_ok(obj: TdObject) -> Result<(), InvocationError> {
    if obj.kind == "ok" {
        Ok(())
    } else {
        Err(InvocationError::Deserialize(format!("expected ok, got {}", obj.kind)))
    }
}
