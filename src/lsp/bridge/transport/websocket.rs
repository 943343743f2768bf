//! WebSocket transport: one text frame per JSON-RPC message.

use std::io;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{Connector, INBOUND_QUEUE_CAPACITY, OUTBOUND_QUEUE_CAPACITY, TransportChannels};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge::transport";

/// Connects to `ws://` / `wss://` endpoints.
///
/// Each session runs two pump tasks bridging the socket and the frame
/// channels. Either side ending tears the whole session down.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, io::Result<TransportChannels>> {
        let endpoint = endpoint.to_string();
        Box::pin(async move {
            let (stream, _response) = connect_async(endpoint.as_str())
                .await
                .map_err(io::Error::other)?;
            debug!(target: LOG_TARGET, "WebSocket connected to {}", endpoint);

            let (mut sink, mut source) = stream.split();
            let (outgoing, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);
            let (inbound_tx, incoming) = mpsc::channel::<String>(INBOUND_QUEUE_CAPACITY);
            let closed = CancellationToken::new();

            let writer_closed = closed.clone();
            let writer_endpoint = endpoint.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = writer_closed.cancelled() => break,
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else {
                                break;
                            };
                            if let Err(err) = sink.send(Message::text(frame)).await {
                                warn!(
                                    target: LOG_TARGET,
                                    "Write to {} failed: {}",
                                    writer_endpoint,
                                    err
                                );
                                break;
                            }
                        }
                    }
                }
                let _ = sink.close().await;
                writer_closed.cancel();
            });

            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        _ = closed.cancelled() => break,
                        message = source.next() => message,
                    };
                    let frame = match message {
                        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                        Some(Ok(Message::Binary(bytes))) => {
                            match String::from_utf8(bytes.to_vec()) {
                                Ok(text) => text,
                                Err(_) => {
                                    warn!(target: LOG_TARGET, "Dropping non UTF-8 binary frame");
                                    continue;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        // Ping/pong is answered by tungstenite itself
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            debug!(target: LOG_TARGET, "Read from {} failed: {}", endpoint, err);
                            break;
                        }
                    };
                    if inbound_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                closed.cancel();
            });

            Ok(TransportChannels { outgoing, incoming })
        })
    }
}
