//! Shared test utilities for pool module tests.
//!
//! Import from submodule tests via `use crate::lsp::bridge::pool::test_helpers::*;`

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::{ConnectionManager, DocumentSource, LanguageConnection, PoolSettings};
use crate::config::ReconnectSettings;
use crate::document::{Document, DocumentRegistry};
use crate::lsp::bridge::actor::{ReaderContext, ReaderTaskHandle, spawn_reader_task};
use crate::lsp::bridge::transport::{MemoryConnector, MemoryPeer};
use crate::surface::ModelHandle;

/// Document source backed by a real registry.
#[derive(Default)]
pub(crate) struct RecordingDocuments {
    registry: DocumentRegistry,
}

impl RecordingDocuments {
    /// Open `(uri, language_id, text)` triples in the given order.
    pub(crate) fn with_documents(documents: &[(&str, &str, &str)]) -> Self {
        let registry = DocumentRegistry::new();
        for (index, (uri, language_id, text)) in documents.iter().enumerate() {
            registry
                .open(uri, language_id, text, ModelHandle::new(index as u64 + 1))
                .unwrap();
        }
        Self { registry }
    }

    pub(crate) fn synced(&self, uri: &str) -> Option<i32> {
        self.registry.get(uri).and_then(|document| document.last_sent_version())
    }
}

impl DocumentSource for RecordingDocuments {
    fn documents_for_language(&self, language_id: &str) -> Vec<Document> {
        self.registry.documents_for_language(language_id)
    }

    fn mark_synced(&self, uri: &str, version: i32) {
        self.registry.mark_synced(uri, version)
    }
}

/// Server end of a session opened by hand, with a reader routing responses.
pub(crate) struct ScriptedPeer {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<String>,
    _reader: ReaderTaskHandle,
}

impl ScriptedPeer {
    pub(crate) async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub(crate) async fn send(&self, frame: String) -> Result<(), mpsc::error::SendError<String>> {
        self.to_client.send(frame).await
    }
}

/// A connection already in Open state, without supervisor.
pub(crate) fn open_connection(
    language_id: &str,
    request_timeout: Duration,
) -> (LanguageConnection, ScriptedPeer) {
    let connection = LanguageConnection::new(
        language_id,
        format!("ws://local/lsp/{}", language_id),
        Arc::new(RecordingDocuments::default()),
        request_timeout,
    );
    let (outbound, from_client) = mpsc::channel(64);
    let (to_client, incoming) = mpsc::channel(64);
    let (notifications, _) = mpsc::unbounded_channel();
    let reader = spawn_reader_task(
        incoming,
        ReaderContext {
            language_id: language_id.to_string(),
            router: connection.router(),
            replies: outbound.clone(),
            notifications,
        },
    );
    connection.open_session(outbound);

    (
        connection,
        ScriptedPeer {
            from_client,
            to_client,
            _reader: reader,
        },
    )
}

/// Manager over the memory transport with short reconnect delays.
pub(crate) fn test_manager(
    server_url: &str,
    request_timeout: Duration,
) -> (ConnectionManager, FakeServer, MemoryConnector) {
    let (connector, accepted) = MemoryConnector::new();
    let settings = PoolSettings {
        server_url: server_url.to_string(),
        request_timeout,
        shutdown_timeout: Duration::from_millis(200),
        reconnect: ReconnectSettings {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(400),
        },
        root_uri: None,
    };
    let (manager, _notifications) = ConnectionManager::new(
        settings,
        Arc::new(connector.clone()),
        Arc::new(RecordingDocuments::default()),
    )
    .unwrap();
    (manager, FakeServer::new(accepted), connector)
}

/// Accepts sessions opened through a [`MemoryConnector`].
pub(crate) struct FakeServer {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl FakeServer {
    pub(crate) fn new(accepted: mpsc::UnboundedReceiver<MemoryPeer>) -> Self {
        Self { accepted }
    }

    pub(crate) async fn accept(&mut self) -> FakeSession {
        let peer = self.accepted.recv().await.unwrap();
        FakeSession {
            peer,
            backlog: VecDeque::new(),
        }
    }
}

/// One scripted language server session.
///
/// Messages skipped while looking for a specific one are kept, so tests can
/// wait for messages in any order.
pub(crate) struct FakeSession {
    peer: MemoryPeer,
    backlog: VecDeque<Value>,
}

impl FakeSession {
    pub(crate) fn endpoint(&self) -> &str {
        self.peer.endpoint()
    }

    async fn next_matching(&mut self, matches: impl Fn(&Value) -> bool) -> Value {
        if let Some(index) = self.backlog.iter().position(&matches) {
            return self.backlog.remove(index).unwrap();
        }
        loop {
            let message = self.peer.recv_json().await.unwrap();
            if matches(&message) {
                return message;
            }
            self.backlog.push_back(message);
        }
    }

    pub(crate) async fn next_request(&mut self, method: &str) -> Value {
        self.next_matching(|message| message["method"] == method && message.get("id").is_some())
            .await
    }

    pub(crate) async fn next_notification(&mut self, method: &str) -> Value {
        self.next_matching(|message| message["method"] == method && message.get("id").is_none())
            .await
    }

    pub(crate) async fn respond(&self, request: &Value, result: Value) {
        self.peer
            .send_json(&json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    pub(crate) async fn respond_error(&self, request: &Value, code: i64, message: &str) {
        self.peer
            .send_json(&json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": code, "message": message}
            }))
            .await;
    }

    /// Answer `initialize` and consume `initialized`.
    pub(crate) async fn complete_handshake(&mut self) {
        let initialize = self.next_request("initialize").await;
        self.respond(&initialize, json!({"capabilities": {"textDocumentSync": 1}}))
            .await;
        self.next_notification("initialized").await;
    }
}
