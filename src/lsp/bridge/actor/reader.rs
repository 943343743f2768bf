//! Reader task for one transport session.
//!
//! The reader task:
//! - Runs in a spawned tokio task
//! - Routes responses via ResponseRouter to oneshot waiters
//! - Answers server-initiated requests directly on the outbound channel
//! - Forwards notifications to the bridge
//! - Stops on end of stream or cancellation, then signals `finished`

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ResponseRouter;
use crate::lsp::bridge::pool::ServerNotification;
use crate::lsp::bridge::protocol::{
    InboundMessage, METHOD_NOT_FOUND, build_error_response, build_result_response,
};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge::reader";

/// Handle to a running reader task.
///
/// Dropping the handle cancels the task.
pub(crate) struct ReaderTaskHandle {
    _join_handle: JoinHandle<()>,
    _cancel_guard: DropGuard,
    finished: CancellationToken,
}

impl ReaderTaskHandle {
    /// Resolves once the reader loop has exited (stream ended or cancelled).
    pub(crate) async fn finished(&self) {
        self.finished.cancelled().await
    }
}

/// Where the reader delivers what it cannot resolve itself.
pub(crate) struct ReaderContext {
    pub(crate) language_id: String,
    pub(crate) router: Arc<ResponseRouter>,
    /// Outbound queue of the same session, used for replies to server requests
    pub(crate) replies: mpsc::Sender<String>,
    pub(crate) notifications: mpsc::UnboundedSender<ServerNotification>,
}

pub(crate) fn spawn_reader_task(
    incoming: mpsc::Receiver<String>,
    context: ReaderContext,
) -> ReaderTaskHandle {
    let cancel_token = CancellationToken::new();
    let finished = CancellationToken::new();

    let join_handle = tokio::spawn(reader_loop(
        incoming,
        context,
        cancel_token.clone(),
        finished.clone(),
    ));

    ReaderTaskHandle {
        _join_handle: join_handle,
        _cancel_guard: cancel_token.drop_guard(),
        finished,
    }
}

async fn reader_loop(
    mut incoming: mpsc::Receiver<String>,
    context: ReaderContext,
    cancel_token: CancellationToken,
    finished: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!(
                    target: LOG_TARGET,
                    "Reader for {} cancelled, shutting down",
                    context.language_id
                );
                break;
            }

            frame = incoming.recv() => {
                match frame {
                    Some(frame) => handle_frame(&frame, &context),
                    None => {
                        debug!(
                            target: LOG_TARGET,
                            "Transport for {} closed",
                            context.language_id
                        );
                        break;
                    }
                }
            }
        }
    }
    finished.cancel();
}

fn handle_frame(frame: &str, context: &ReaderContext) {
    let message = match InboundMessage::parse(frame) {
        Ok(message) => message,
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                "Dropping frame from {}: {}",
                context.language_id,
                err
            );
            return;
        }
    };

    match message {
        InboundMessage::Response { id, payload } => {
            if !context.router.route(id, payload) {
                debug!(
                    target: LOG_TARGET,
                    "Response for unknown or abandoned request #{}, dropping",
                    id
                );
            }
        }
        InboundMessage::ServerRequest { id, method, params } => {
            let reply = answer_server_request(id, &method, &params);
            if context.replies.try_send(reply.to_string()).is_err() {
                warn!(
                    target: LOG_TARGET,
                    "Could not reply to {} from {}: outbound queue unavailable",
                    method,
                    context.language_id
                );
            }
        }
        InboundMessage::Notification { method, params } => {
            let notification = ServerNotification {
                language_id: context.language_id.clone(),
                method,
                params,
            };
            if context.notifications.send(notification).is_err() {
                debug!(
                    target: LOG_TARGET,
                    "Notification receiver gone, dropping"
                );
            }
        }
    }
}

/// Build the reply to a server-initiated request.
///
/// Registration and progress requests are acknowledged, configuration is
/// answered with one `null` per requested item, and everything else is
/// reported as unsupported.
fn answer_server_request(id: Value, method: &str, params: &Value) -> Value {
    match method {
        "client/registerCapability"
        | "client/unregisterCapability"
        | "window/workDoneProgress/create"
        | "window/showMessageRequest" => build_result_response(id, Value::Null),
        "workspace/configuration" => {
            let items = params
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            build_result_response(id, Value::Array(vec![Value::Null; items]))
        }
        _ => build_error_response(
            id,
            METHOD_NOT_FOUND,
            &format!("Unhandled method {}", method),
        ),
    }
}
