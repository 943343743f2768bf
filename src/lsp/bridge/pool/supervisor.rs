//! Connection supervisor: connect, handshake, replay, and reconnect with backoff.
//!
//! One supervisor task runs per [`LanguageConnection`] for its whole lifetime.
//! It owns every transport session of the connection and is the only writer
//! of the connection state besides teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::handshake::perform_lsp_handshake;
use super::shutdown::graceful_shutdown;
use super::{ConnectionState, LanguageConnection, ServerNotification};
use crate::config::ReconnectSettings;
use crate::lsp::bridge::actor::{ReaderContext, spawn_reader_task};
use crate::lsp::bridge::transport::{Connector, TransportChannels};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge";

/// Everything a supervisor needs besides its connection.
pub(super) struct SupervisorContext {
    pub(super) connector: Arc<dyn Connector>,
    pub(super) notifications: mpsc::UnboundedSender<ServerNotification>,
    pub(super) reconnect: ReconnectSettings,
    pub(super) shutdown_timeout: Duration,
    pub(super) root_uri: Option<String>,
}

/// How a transport session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Transport closed or handshake failed; `opened` tells whether the
    /// connection reached Open during the session
    Lost { opened: bool },
    /// Teardown requested
    TornDown,
}

pub(super) async fn run(connection: Arc<LanguageConnection>, context: SupervisorContext) {
    let cancel = connection.cancel_token();
    let mut backoff = Backoff::new(context.reconnect);

    loop {
        connection.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = context.connector.connect(connection.endpoint()) => result,
        };

        match connected {
            Ok(channels) => match run_session(&connection, channels, &context, &cancel).await {
                SessionEnd::TornDown => break,
                SessionEnd::Lost { opened: true } => backoff.reset(),
                SessionEnd::Lost { opened: false } => {}
            },
            Err(err) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Connecting to {} failed: {}",
                    connection.endpoint(),
                    err
                );
                connection.set_state(ConnectionState::Reconnecting);
            }
        }

        let delay = backoff.next_delay();
        log::debug!(
            target: LOG_TARGET,
            "Reconnecting {} in {:?}",
            connection.language_id(),
            delay
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    connection.end_session(ConnectionState::Closed);
    log::info!(
        target: LOG_TARGET,
        "{} connection closed",
        connection.language_id()
    );
}

async fn run_session(
    connection: &LanguageConnection,
    channels: TransportChannels,
    context: &SupervisorContext,
    cancel: &CancellationToken,
) -> SessionEnd {
    let TransportChannels { outgoing, incoming } = channels;
    let reader = spawn_reader_task(
        incoming,
        ReaderContext {
            language_id: connection.language_id().to_string(),
            router: connection.router(),
            replies: outgoing.clone(),
            notifications: context.notifications.clone(),
        },
    );

    let handshake = tokio::select! {
        _ = cancel.cancelled() => return SessionEnd::TornDown,
        _ = reader.finished() => {
            Err(crate::error::BridgeError::connection_lost(connection.language_id()))
        }
        result = perform_lsp_handshake(connection, &outgoing, context.root_uri.as_deref()) => {
            result
        }
    };

    if let Err(err) = handshake {
        log::warn!(
            target: LOG_TARGET,
            "Handshake with {} failed: {}",
            connection.endpoint(),
            err
        );
        connection.end_session(ConnectionState::Reconnecting);
        return SessionEnd::Lost { opened: false };
    }

    connection.open_session(outgoing.clone());

    tokio::select! {
        _ = cancel.cancelled() => {
            graceful_shutdown(connection, &outgoing, &reader, context.shutdown_timeout).await;
            return SessionEnd::TornDown;
        }
        _ = reader.finished() => {}
    }

    log::warn!(
        target: LOG_TARGET,
        "{} connection lost",
        connection.language_id()
    );
    connection.end_session(ConnectionState::Reconnecting);
    SessionEnd::Lost { opened: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::bridge::pool::test_helpers::{FakeServer, RecordingDocuments};
    use crate::lsp::bridge::transport::MemoryConnector;

    fn spawn_supervisor(
        documents: Arc<RecordingDocuments>,
    ) -> (Arc<LanguageConnection>, FakeServer, MemoryConnector) {
        let (connector, accepted) = MemoryConnector::new();
        let connection = Arc::new(LanguageConnection::new(
            "javascript",
            "ws://local/lsp/javascript".into(),
            documents,
            Duration::from_secs(5),
        ));
        let (notifications, _) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(
            Arc::clone(&connection),
            SupervisorContext {
                connector: Arc::new(connector.clone()),
                notifications,
                reconnect: ReconnectSettings {
                    initial_delay: Duration::from_millis(500),
                    max_delay: Duration::from_millis(3000),
                },
                shutdown_timeout: Duration::from_millis(200),
                root_uri: None,
            },
        ));
        connection.set_supervisor(handle);
        (connection, FakeServer::new(accepted), connector)
    }

    async fn wait_for(connection: &LanguageConnection, state: ConnectionState) {
        let mut states = connection.subscribe_state();
        while *states.borrow_and_update() != state {
            states.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_handshake_and_replays_documents() {
        let documents = Arc::new(RecordingDocuments::with_documents(&[(
            "file:///a.js",
            "javascript",
            "let a = 1;",
        )]));
        let (connection, mut server, _connector) = spawn_supervisor(Arc::clone(&documents));

        let mut session = server.accept().await;
        session.complete_handshake().await;
        wait_for(&connection, ConnectionState::Open).await;

        let did_open = session.next_notification("textDocument/didOpen").await;
        assert_eq!(did_open["params"]["textDocument"]["uri"], "file:///a.js");
        assert_eq!(documents.synced("file:///a.js"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_session_reconnects_with_backoff() {
        let documents = Arc::new(RecordingDocuments::default());
        let (connection, mut server, connector) = spawn_supervisor(documents);

        let mut session = server.accept().await;
        session.complete_handshake().await;
        wait_for(&connection, ConnectionState::Open).await;

        connector.set_refuse(true);
        drop(session);
        wait_for(&connection, ConnectionState::Reconnecting).await;

        let lost_at = tokio::time::Instant::now();
        while connector.attempts() < 2 {
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(lost_at.elapsed() >= Duration::from_millis(500));

        connector.set_refuse(false);
        let mut session = server.accept().await;
        session.complete_handshake().await;
        wait_for(&connection, ConnectionState::Open).await;
        // 500ms after the loss, then 1000ms after the refused attempt
        assert!(lost_at.elapsed() >= Duration::from_millis(1500));
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_while_open_sends_shutdown_and_exit() {
        let documents = Arc::new(RecordingDocuments::default());
        let (connection, mut server, _connector) = spawn_supervisor(documents);

        let mut session = server.accept().await;
        session.complete_handshake().await;
        wait_for(&connection, ConnectionState::Open).await;

        let responder = tokio::spawn(async move {
            let shutdown = session.next_request("shutdown").await;
            session.respond(&shutdown, serde_json::Value::Null).await;
            session.next_notification("exit").await
        });

        connection.teardown().await;

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(responder.await.unwrap()["method"], "exit");
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_while_connecting_closes() {
        let documents = Arc::new(RecordingDocuments::default());
        let (connection, _server, connector) = spawn_supervisor(documents);
        connector.set_refuse(true);

        tokio::time::sleep(Duration::from_millis(50)).await;
        connection.teardown().await;

        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
