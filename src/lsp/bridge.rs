//! Connections from the editor to out-of-process language servers.
//!
//! # Module Structure
//!
//! - `actor` - Response router and per-session reader task
//! - `pool` - ConnectionManager and per-language LanguageConnection (supervisor, handshake, backoff)
//! - `protocol` - JSON-RPC message building and decoding
//! - `transport` - Connector trait with WebSocket and in-memory implementations
//! - `text_document` / `workspace` - LSP methods layered on the pool

mod actor;
mod pool;
mod protocol;
mod text_document;
pub mod transport;
mod workspace;

pub use pool::{
    ConnectionManager, ConnectionState, DocumentSource, LanguageConnection,
    NotificationSendResult, PoolSettings, ServerNotification,
};
pub(crate) use protocol::decode_publish_diagnostics;
pub use transport::{Connector, MemoryConnector, MemoryPeer, TransportChannels, WebSocketConnector};
