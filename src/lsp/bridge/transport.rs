//! Transports carrying JSON-RPC frames to a language server.
//!
//! A [`Connector`] turns an endpoint url into a pair of frame channels. The
//! connection supervisor owns reconnects, so a connector only ever makes a
//! single attempt per call.

mod memory;
mod websocket;

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WebSocketConnector;

use futures::future::BoxFuture;
use std::io;
use tokio::sync::mpsc;

/// Capacity of the per-session outbound queue.
///
/// Notifications are dropped with a warning when the queue is full rather
/// than stalling the editor.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the per-session inbound queue.
pub(crate) const INBOUND_QUEUE_CAPACITY: usize = 256;

/// The two directions of one transport session.
///
/// The session ends when `incoming` yields `None`. Dropping `outgoing`
/// closes the underlying transport.
pub struct TransportChannels {
    pub outgoing: mpsc::Sender<String>,
    pub incoming: mpsc::Receiver<String>,
}

/// Opens transport sessions to language server endpoints.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str) -> BoxFuture<'static, io::Result<TransportChannels>>;
}
