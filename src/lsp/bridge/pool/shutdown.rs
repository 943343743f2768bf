//! Shutdown coordination for language connections.
//!
//! A live session is ended with the LSP `shutdown` request followed by the
//! `exit` notification, bounded by the configured shutdown timeout.
//! [`ConnectionManager::shutdown_all`] tears every connection down in parallel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{ConnectionManager, ConnectionState, LanguageConnection};
use crate::error::BridgeError;
use crate::lsp::bridge::actor::ReaderTaskHandle;
use crate::lsp::bridge::protocol::build_notification;

const LOG_TARGET: &str = "editor_lsp_bridge::bridge";

/// End a live session gracefully.
///
/// The connection moves to Closed first, so new requests fail fast and every
/// pending request is released with `ConnectionLost`. The server then gets
/// `shutdown` and `exit`; a server that dies or stays silent only shortens
/// the wait.
pub(super) async fn graceful_shutdown(
    connection: &LanguageConnection,
    outbound: &mpsc::Sender<String>,
    reader: &ReaderTaskHandle,
    shutdown_timeout: Duration,
) {
    connection.end_session(ConnectionState::Closed);
    let deadline = Instant::now() + shutdown_timeout;

    let result = tokio::select! {
        result = connection.exchange_on(outbound, "shutdown", Value::Null, deadline) => result,
        _ = reader.finished() => Err(BridgeError::connection_lost(connection.language_id())),
    };

    if let Err(err) = result {
        log::debug!(
            target: LOG_TARGET,
            "Shutdown request to {} did not complete: {}",
            connection.language_id(),
            err
        );
    }

    let exit = build_notification("exit", Value::Null).to_string();
    if outbound.try_send(exit).is_err() {
        log::debug!(
            target: LOG_TARGET,
            "Could not send exit to {}",
            connection.language_id()
        );
    }
}

impl ConnectionManager {
    /// Drains a JoinSet, logging any task panics with the provided context.
    async fn drain_join_set(join_set: &mut tokio::task::JoinSet<()>, task_context: &str) {
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                log::error!(
                    target: LOG_TARGET,
                    "{} panicked: {}",
                    task_context,
                    e
                );
            }
        }
    }

    /// Tear down every connection in parallel.
    ///
    /// Each connection performs its own bounded shutdown handshake, so the
    /// whole call is bounded by the shutdown timeout plus scheduling.
    pub async fn shutdown_all(&self) {
        let connections: Vec<(String, Arc<LanguageConnection>)> = self.drain_connections();
        if connections.is_empty() {
            return;
        }

        let mut join_set = tokio::task::JoinSet::new();
        for (language, connection) in connections {
            join_set.spawn(async move {
                log::debug!(
                    target: LOG_TARGET,
                    "Shutting down {} connection ({})",
                    language,
                    connection.state()
                );
                connection.teardown().await;
            });
        }

        Self::drain_join_set(&mut join_set, "connection teardown").await;
    }
}
