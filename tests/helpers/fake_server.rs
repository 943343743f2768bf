//! Scripted language server over the in-memory transport.

use std::collections::VecDeque;
use std::time::Duration;

use editor_lsp_bridge::lsp::bridge::MemoryPeer;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Accepts the sessions the bridge opens, one per connect.
pub struct FakeServer {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl FakeServer {
    pub fn new(accepted: mpsc::UnboundedReceiver<MemoryPeer>) -> Self {
        Self { accepted }
    }

    pub async fn accept(&mut self) -> FakeSession {
        let peer = tokio::time::timeout(Duration::from_secs(60), self.accepted.recv())
            .await
            .expect("no session was opened")
            .expect("connector dropped");
        FakeSession {
            peer,
            backlog: VecDeque::new(),
        }
    }

    /// Accept a session and answer its handshake.
    pub async fn accept_initialized(&mut self) -> FakeSession {
        let mut session = self.accept().await;
        session.complete_handshake().await;
        session
    }
}

/// One language server session.
///
/// Messages skipped while waiting for a specific one are kept in a backlog.
pub struct FakeSession {
    peer: MemoryPeer,
    backlog: VecDeque<Value>,
}

impl FakeSession {
    pub fn endpoint(&self) -> &str {
        self.peer.endpoint()
    }

    async fn next_matching(&mut self, matches: impl Fn(&Value) -> bool) -> Option<Value> {
        if let Some(index) = self.backlog.iter().position(&matches) {
            return self.backlog.remove(index);
        }
        while let Some(message) = self.peer.recv_json().await {
            if matches(&message) {
                return Some(message);
            }
            self.backlog.push_back(message);
        }
        None
    }

    pub async fn next_request(&mut self, method: &str) -> Value {
        tokio::time::timeout(
            Duration::from_secs(60),
            self.next_matching(|message| {
                message["method"] == method && message.get("id").is_some()
            }),
        )
        .await
        .unwrap_or_else(|_| panic!("no {} request arrived", method))
        .unwrap_or_else(|| panic!("session closed before {} request", method))
    }

    pub async fn next_notification(&mut self, method: &str) -> Value {
        tokio::time::timeout(
            Duration::from_secs(60),
            self.next_matching(|message| {
                message["method"] == method && message.get("id").is_none()
            }),
        )
        .await
        .unwrap_or_else(|_| panic!("no {} notification arrived", method))
        .unwrap_or_else(|| panic!("session closed before {} notification", method))
    }

    /// Whether a `method` notification arrives within `window`.
    pub async fn receives_notification_within(&mut self, method: &str, window: Duration) -> bool {
        let arrived = tokio::time::timeout(
            window,
            self.next_matching(|message| {
                message["method"] == method && message.get("id").is_none()
            }),
        )
        .await;
        matches!(arrived, Ok(Some(_)))
    }

    pub async fn respond(&self, request: &Value, result: Value) {
        self.peer
            .send_json(&json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    pub async fn respond_error(&self, request: &Value, code: i64, message: &str) {
        self.peer
            .send_json(&json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": code, "message": message}
            }))
            .await;
    }

    pub async fn notify(&self, method: &str, params: Value) {
        self.peer
            .send_json(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    pub async fn publish_diagnostics(&self, uri: &str, version: Option<i32>, messages: &[&str]) {
        let diagnostics: Vec<Value> = messages
            .iter()
            .map(|message| {
                json!({
                    "range": {
                        "start": {"line": 0, "character": 0},
                        "end": {"line": 0, "character": 1}
                    },
                    "severity": 1,
                    "source": "fake",
                    "message": message
                })
            })
            .collect();
        let mut params = json!({"uri": uri, "diagnostics": diagnostics});
        if let Some(version) = version {
            params["version"] = json!(version);
        }
        self.notify("textDocument/publishDiagnostics", params).await;
    }

    /// Answer `initialize` and consume `initialized`.
    pub async fn complete_handshake(&mut self) {
        let initialize = self.next_request("initialize").await;
        self.respond(
            &initialize,
            json!({"capabilities": {"textDocumentSync": 1, "documentFormattingProvider": true}}),
        )
        .await;
        self.next_notification("initialized").await;
    }
}
