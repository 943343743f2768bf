//! In-process transport.
//!
//! Every successful `connect` hands the server side of the session to the
//! receiver returned by [`MemoryConnector::new`]. Hosts embedding a language
//! server in-process and tests driving scripted servers both use it.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{Connector, INBOUND_QUEUE_CAPACITY, OUTBOUND_QUEUE_CAPACITY, TransportChannels};

/// Server side of one in-memory session.
///
/// Dropping the peer ends the session for the client.
pub struct MemoryPeer {
    endpoint: String,
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<String>,
}

impl MemoryPeer {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Next frame sent by the client; `None` once the client closed the session.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame decoded as JSON. Frames that are not JSON are skipped.
    pub async fn recv_json(&mut self) -> Option<Value> {
        while let Some(frame) = self.recv().await {
            if let Ok(value) = serde_json::from_str(&frame) {
                return Some(value);
            }
        }
        None
    }

    /// Send a frame to the client. Returns false if the client is gone.
    pub async fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).await.is_ok()
    }

    pub async fn send_json(&self, value: &Value) -> bool {
        self.send(value.to_string()).await
    }
}

#[derive(Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, accepted) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                refuse: Arc::new(AtomicBool::new(false)),
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            accepted,
        )
    }

    /// Make subsequent connects fail as if the server were down.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect calls so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, io::Result<TransportChannels>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.refuse.load(Ordering::SeqCst) {
            Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("memory transport refused {}", endpoint),
            ))
        } else {
            let (outgoing, from_client) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
            let (to_client, incoming) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
            let peer = MemoryPeer {
                endpoint: endpoint.to_string(),
                from_client,
                to_client,
            };
            self.peers
                .send(peer)
                .map(|()| TransportChannels { outgoing, incoming })
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::NotConnected, "no memory server listening")
                })
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_hands_peer_to_server_side() {
        let (connector, mut accepted) = MemoryConnector::new();

        let mut channels = connector.connect("ws://local/lsp/python").await.unwrap();
        let mut peer = accepted.recv().await.unwrap();

        assert_eq!(peer.endpoint(), "ws://local/lsp/python");
        channels.outgoing.send("{\"a\":1}".into()).await.unwrap();
        assert_eq!(peer.recv_json().await.unwrap()["a"], 1);
        assert!(peer.send("pong").await);
        assert_eq!(channels.incoming.recv().await.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn refused_connects_are_counted() {
        let (connector, _accepted) = MemoryConnector::new();
        connector.set_refuse(true);

        let err = connector.connect("ws://local/lsp/js").await.err().unwrap();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn dropping_peer_ends_client_stream() {
        let (connector, mut accepted) = MemoryConnector::new();
        let mut channels = connector.connect("ws://local/lsp/js").await.unwrap();

        drop(accepted.recv().await.unwrap());

        assert!(channels.incoming.recv().await.is_none());
    }
}
