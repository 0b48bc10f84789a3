//! Shared test double: a scripted in-memory transport.

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tdbridge_client::{
    event_channel, Client, Config, EventSender, InvokeFuture, RpcError, TdObject, Transport,
};

/// Records every invocation and replays scripted outcomes per method.
/// Methods with no scripted outcome left answer with the bare `ok` sentinel.
#[derive(Default)]
pub struct ScriptedTransport {
    calls:  Mutex<Vec<(String, Value)>>,
    script: Mutex<HashMap<String, VecDeque<Result<TdObject, RpcError>>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn expect(&self, method: &str, outcome: Result<TdObject, RpcError>) {
        self.script
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn calls_of(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(m, _)| m == method).count()
    }

    pub fn nth_call(&self, method: &str, n: usize) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .nth(n)
            .map(|(_, p)| p.clone())
    }
}

impl Transport for ScriptedTransport {
    fn invoke(&self, method: &str, params: Value) -> InvokeFuture<'_> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(TdObject::ok()));
        Box::pin(async move { outcome })
    }
}

/// The event flipping the client into the ready state.
pub fn ready_event() -> TdObject {
    TdObject::new(
        "updateAuthorizationState",
        json!({ "authorization_state": { "@type": "authorizationStateReady" } }),
    )
}

/// Connect a client to the transport and drive it until ready.
pub async fn connect_ready(
    transport: Arc<ScriptedTransport>,
    config: Config,
) -> (Client, EventSender) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, rx) = event_channel();
    let client = Client::connect(transport, rx, config);
    tx.send(ready_event()).unwrap();
    while client.get_me().await.is_err() {
        tokio::task::yield_now().await;
    }
    (client, tx)
}
