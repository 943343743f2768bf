//! JSON-RPC envelopes and LSP payloads exchanged with language servers.
//!
//! ## Module Structure
//!
//! - `request_id` - RequestId type for type-safe request ID handling
//! - `message` - Envelope builders, inbound classification and response decoding
//! - `lifecycle` - initialize/initialized payloads and initialize validation
//! - `request` - Params builders and result decoders for document and workspace methods

mod lifecycle;
mod message;
mod request;
mod request_id;

pub(crate) use lifecycle::*;
pub(crate) use message::*;
pub(crate) use request::*;
pub(crate) use request_id::RequestId;
