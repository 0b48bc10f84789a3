//! Request-side behavior: readiness gating, identity resolution, chat
//! preparation, and outbound payload shaping.

mod common;

use std::time::Duration;

use serde_json::json;
use tdbridge_client::{
    Button, Config, InputMessage, InvocationError, RpcError, TdObject, TokenCipher,
};

use common::{connect_ready, ScriptedTransport};

fn chat_obj(id: i64) -> TdObject {
    TdObject::new("chat", json!({ "id": id, "title": "t" }))
}

// ─── Readiness ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn operations_reject_before_ready_without_transport_call() {
    let t = ScriptedTransport::new();
    let (tx, rx) = tdbridge_client::event_channel();
    let client = tdbridge_client::Client::connect(t.clone(), rx, Config::default());

    match client.send_message("42", "hi").await {
        Err(InvocationError::NotReady) => {}
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert_eq!(t.calls_of("sendMessage"), 0);
    assert_eq!(t.calls_of("getChat"), 0);
    drop(tx);
}

#[tokio::test]
async fn resolution_and_preparation_also_reject_before_ready() {
    let t = ScriptedTransport::new();
    let (tx, rx) = tdbridge_client::event_channel();
    let client = tdbridge_client::Client::connect(t.clone(), rx, Config::default());

    match client.resolve_chat("@example").await {
        Err(InvocationError::NotReady) => {}
        other => panic!("expected NotReady, got {other:?}"),
    }
    match client.ensure_chat(42).await {
        Err(InvocationError::NotReady) => {}
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert_eq!(t.calls_of("searchPublicChat"), 0);
    assert_eq!(t.calls_of("getChat"), 0);
    drop(tx);
}

// ─── Identity resolution ──────────────────────────────────────────────────────

#[tokio::test]
async fn numeric_handles_bypass_cache_and_transport() {
    let t = ScriptedTransport::new();
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    assert_eq!(client.resolve_chat("42").await.unwrap(), 42);
    assert_eq!(client.resolve_chat("-1000000000100").await.unwrap(), -1_000_000_000_100);
    assert_eq!(t.calls_of("searchPublicChat"), 0);
}

#[tokio::test]
async fn username_resolved_once_within_ttl() {
    let t = ScriptedTransport::new();
    t.expect("searchPublicChat", Ok(chat_obj(77)));
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    assert_eq!(client.resolve_chat("@Example").await.unwrap(), 77);
    // Different spelling, same normalized handle: must hit the cache.
    assert_eq!(client.resolve_chat("example").await.unwrap(), 77);
    assert_eq!(t.calls_of("searchPublicChat"), 1);
    assert_eq!(
        t.nth_call("searchPublicChat", 0).unwrap()["username"],
        json!("example")
    );
}

#[tokio::test]
async fn expired_entries_trigger_fresh_lookup() {
    let t = ScriptedTransport::new();
    t.expect("searchPublicChat", Ok(chat_obj(77)));
    t.expect("searchPublicChat", Ok(chat_obj(78)));
    let config = Config { resolve_ttl: Duration::ZERO, ..Config::default() };
    let (client, _tx) = connect_ready(t.clone(), config).await;

    assert_eq!(client.resolve_chat("@example").await.unwrap(), 77);
    assert_eq!(client.resolve_chat("@example").await.unwrap(), 78);
    assert_eq!(t.calls_of("searchPublicChat"), 2);
}

#[tokio::test]
async fn empty_handle_fails_fast() {
    let t = ScriptedTransport::new();
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    assert!(matches!(client.resolve_chat("@").await, Err(InvocationError::Resolve(_))));
    assert_eq!(t.calls_of("searchPublicChat"), 0);
}

#[tokio::test]
async fn rate_limited_lookup_propagates_verbatim() {
    let t = ScriptedTransport::new();
    t.expect(
        "searchPublicChat",
        Err(RpcError::new(429, "Too Many Requests: retry after 9")),
    );
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    match client.resolve_chat("@example").await {
        Err(e @ InvocationError::Rpc(_)) => assert_eq!(e.retry_after_seconds(), Some(9)),
        other => panic!("expected verbatim Rpc error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_handle_is_wrapped_and_not_cached() {
    let t = ScriptedTransport::new();
    t.expect("searchPublicChat", Err(RpcError::new(400, "USERNAME_NOT_OCCUPIED")));
    t.expect("searchPublicChat", Ok(chat_obj(5)));
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    assert!(matches!(client.resolve_chat("@ghost").await, Err(InvocationError::Resolve(_))));
    // The failure was not cached: the next attempt looks up again.
    assert_eq!(client.resolve_chat("@ghost").await.unwrap(), 5);
    assert_eq!(t.calls_of("searchPublicChat"), 2);
}

// ─── Chat preparation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn ensure_chat_probes_only_once() {
    let t = ScriptedTransport::new();
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    client.ensure_chat(42).await.unwrap();
    client.ensure_chat(42).await.unwrap();
    assert_eq!(t.calls_of("getChat"), 1);
    assert_eq!(t.calls_of("createPrivateChat"), 0);
}

#[tokio::test]
async fn unknown_channel_is_created_from_its_supergroup_id() {
    let t = ScriptedTransport::new();
    t.expect("getChat", Err(RpcError::new(400, "Chat not found")));
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    client.ensure_chat(-1_000_000_000_100).await.unwrap();

    assert_eq!(t.nth_call("getSupergroup", 0).unwrap()["supergroup_id"], json!(100));
    assert_eq!(t.nth_call("createSupergroupChat", 0).unwrap()["supergroup_id"], json!(100));

    // Second call is a pure membership check.
    client.ensure_chat(-1_000_000_000_100).await.unwrap();
    assert_eq!(t.calls_of("getChat"), 1);
    assert_eq!(t.calls_of("createSupergroupChat"), 1);
}

#[tokio::test]
async fn unknown_basic_group_is_created() {
    let t = ScriptedTransport::new();
    t.expect("getChat", Err(RpcError::new(400, "Chat not found")));
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    client.ensure_chat(-5).await.unwrap();
    assert_eq!(t.nth_call("getBasicGroup", 0).unwrap()["basic_group_id"], json!(5));
    assert_eq!(t.calls_of("createBasicGroupChat"), 1);
}

#[tokio::test]
async fn failed_preparation_is_retried_in_full() {
    let t = ScriptedTransport::new();
    t.expect("getChat", Err(RpcError::new(400, "Chat not found")));
    t.expect("createPrivateChat", Err(RpcError::new(500, "Internal Server Error")));
    t.expect("getChat", Err(RpcError::new(400, "Chat not found")));
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    assert!(client.ensure_chat(7).await.is_err());
    // The chat was not marked initialized, so the whole sequence reruns.
    client.ensure_chat(7).await.unwrap();
    assert_eq!(t.calls_of("getChat"), 2);
    assert_eq!(t.calls_of("createPrivateChat"), 2);
}

// ─── Outbound payload shaping ─────────────────────────────────────────────────

#[tokio::test]
async fn keyboard_payloads_are_encrypted_and_nondeterministic() {
    let t = ScriptedTransport::new();
    let config = Config { callback_secret: Some("s3cret".into()), ..Config::default() };
    let (client, tx) = connect_ready(t.clone(), config).await;

    t.expect(
        "sendMessage",
        Ok(TdObject::new("message", json!({ "id": 3i64 << 20, "chat_id": 42 }))),
    );
    let msg = InputMessage::text("pick").keyboard(vec![vec![
        Button::new("a", b"same".to_vec()),
        Button::new("b", b"same".to_vec()),
    ]]);

    let client2 = client.clone();
    let sent = tokio::spawn(async move { client2.send_message("42", msg).await });
    while client.pending_waits().await == 0 {
        tokio::task::yield_now().await;
    }
    tx.send(TdObject::new(
        "updateMessageSendSucceeded",
        json!({ "old_message_id": 3i64 << 20, "message": { "id": 9i64 << 20, "chat_id": 42 } }),
    ))
    .unwrap();
    sent.await.unwrap().unwrap();

    let params = t.nth_call("sendMessage", 0).unwrap();
    let rows = &params["reply_markup"]["rows"];
    let tok_a = rows[0][0]["type"]["data"].as_str().unwrap();
    let tok_b = rows[0][1]["type"]["data"].as_str().unwrap();
    assert_ne!(tok_a, tok_b, "same payload must never produce the same token");

    let cipher = TokenCipher::from_secret(Some("s3cret"));
    assert_eq!(cipher.decrypt(tok_a).unwrap(), b"same");
    assert_eq!(cipher.decrypt(tok_b).unwrap(), b"same");
}

#[tokio::test]
async fn oversized_button_payload_is_rejected_before_sending() {
    let t = ScriptedTransport::new();
    let (client, _tx) = connect_ready(t.clone(), Config::default()).await;

    let msg = InputMessage::text("x")
        .keyboard(vec![vec![Button::new("big", vec![0u8; 64])]]);
    match client.send_message("42", msg).await {
        Err(InvocationError::Cipher(_)) => {}
        other => panic!("expected Cipher error, got {other:?}"),
    }
    assert_eq!(t.calls_of("sendMessage"), 0);
}

#[tokio::test]
async fn reply_ids_are_transcoded_inward() {
    let t = ScriptedTransport::new();
    t.expect(
        "sendMessage",
        Ok(TdObject::new("message", json!({ "id": 1i64 << 20, "chat_id": 42 }))),
    );
    let (client, tx) = connect_ready(t.clone(), Config::default()).await;

    let client2 = client.clone();
    let sent = tokio::spawn(async move {
        client2.send_message("42", InputMessage::text("re").reply_to(Some(55))).await
    });
    while client.pending_waits().await == 0 {
        tokio::task::yield_now().await;
    }
    tx.send(TdObject::new(
        "updateMessageSendSucceeded",
        json!({ "old_message_id": 1i64 << 20, "message": { "id": 2i64 << 20, "chat_id": 42 } }),
    ))
    .unwrap();
    sent.await.unwrap().unwrap();

    let params = t.nth_call("sendMessage", 0).unwrap();
    assert_eq!(params["reply_to_message_id"], json!(55i64 << 20));
}
