//! LSP initialize/initialized handshake for a fresh transport session.
//!
//! The handshake follows the LSP lifecycle:
//! 1. Send `initialize` request
//! 2. Wait for `initialize` response
//! 3. Send `initialized` notification

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::LanguageConnection;
use crate::error::{BridgeError, BridgeResult};
use crate::lsp::bridge::protocol::{
    build_notification, initialize_params, initialized_params, validate_initialize_response,
};

/// Perform the handshake on `outbound`.
///
/// Runs before the connection is Open, so it goes through
/// [`LanguageConnection::exchange_on`] instead of the gated request path.
/// The whole exchange is bounded by the request timeout.
pub(super) async fn perform_lsp_handshake(
    connection: &LanguageConnection,
    outbound: &mpsc::Sender<String>,
    root_uri: Option<&str>,
) -> BridgeResult<()> {
    let deadline = Instant::now() + connection.request_timeout();

    let response = connection
        .exchange_on(
            outbound,
            "initialize",
            initialize_params(connection.language_id(), root_uri),
            deadline,
        )
        .await?;

    validate_initialize_response(&response)?;

    let initialized = build_notification("initialized", initialized_params()).to_string();
    outbound
        .try_send(initialized)
        .map_err(|_| BridgeError::connection_lost(connection.language_id()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::bridge::pool::test_helpers::RecordingDocuments;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    fn connection() -> LanguageConnection {
        LanguageConnection::new(
            "javascript",
            "ws://local/lsp/javascript".into(),
            Arc::new(RecordingDocuments::default()),
            Duration::from_millis(500),
        )
    }

    /// Answer frames that carry an id; the handshake has no reader task here,
    /// so responses are routed by hand.
    async fn answer_initialize(
        connection: &LanguageConnection,
        server: &mut mpsc::Receiver<String>,
        response: impl FnOnce(Value) -> Value,
    ) {
        let request: Value = serde_json::from_str(&server.recv().await.unwrap()).unwrap();
        assert_eq!(request["method"], "initialize");
        assert_eq!(
            request["params"]["initializationOptions"]["languageId"],
            "javascript"
        );
        let id = crate::lsp::bridge::protocol::RequestId::from_json(&request).unwrap();
        connection.router().route(id, response(request["id"].clone()));
    }

    #[tokio::test]
    async fn handshake_sends_initialized_after_response() {
        let connection = connection();
        let (outbound, mut server) = mpsc::channel(8);

        let (result, ()) = tokio::join!(
            perform_lsp_handshake(&connection, &outbound, None),
            answer_initialize(&connection, &mut server, |id| {
                json!({"jsonrpc": "2.0", "id": id, "result": {"capabilities": {}}})
            })
        );

        result.unwrap();
        let initialized: Value = serde_json::from_str(&server.recv().await.unwrap()).unwrap();
        assert_eq!(initialized["method"], "initialized");
    }

    #[tokio::test]
    async fn initialize_error_fails_handshake() {
        let connection = connection();
        let (outbound, mut server) = mpsc::channel(8);

        let (result, ()) = tokio::join!(
            perform_lsp_handshake(&connection, &outbound, None),
            answer_initialize(&connection, &mut server, |id| {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32603, "message": "boom"}})
            })
        );

        assert!(matches!(result, Err(BridgeError::Server { code: -32603, .. })));
        assert!(server.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let connection = connection();
        let (outbound, _server) = mpsc::channel(8);

        let result = perform_lsp_handshake(&connection, &outbound, None).await;

        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
        assert_eq!(connection.pending_requests(), 0);
    }
}
