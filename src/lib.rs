//! Client half of an editor to language server bridge.
//!
//! An [`EditorBridge`] keeps the documents of an embedded editor (abstracted
//! as an [`EditableSurface`]) in sync with one language server connection
//! per language, applies pushed diagnostics as markers, and maintains a
//! per-project metadata cache.

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod lsp;
pub mod surface;

pub use cache::{FileMetadata, MetadataCache, ProjectCache};
pub use config::BridgeSettings;
pub use document::{Document, DocumentRegistry};
pub use error::{BridgeError, BridgeResult};
pub use lsp::bridge::{ConnectionState, Connector, MemoryConnector, WebSocketConnector};
pub use lsp::{Diagnostic, EditorBridge};
pub use surface::{EditableSurface, MemorySurface, ModelHandle, ViewState};
