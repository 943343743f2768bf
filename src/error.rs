//! Error handling types for the editor bridge
//!
//! This module provides the error taxonomy shared by the connection manager,
//! the protocol adapter, the document registry and the metadata cache.

use std::sync::PoisonError;
use thiserror::Error;

/// Error type for bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Transport closed while the request was in flight, or the connection
    /// was torn down before it could be sent
    #[error("Connection lost: {language}")]
    ConnectionLost { language: String },

    /// No response arrived within the request timeout
    #[error("Request timed out: {method}")]
    Timeout { method: String },

    /// The server sent something that does not decode as expected
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The server answered with a well-formed JSON-RPC error
    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    /// Operation on a uri that is not open
    #[error("Document not found: {uri}")]
    NotFound { uri: String },

    /// `open` or `rename` targeting a uri that is already open
    #[error("Document already open: {uri}")]
    DocumentAlreadyOpen { uri: String },

    /// Formatting requested while no document is active
    #[error("No active document")]
    NoActiveDocument,

    /// The request was abandoned locally because its document was closed or renamed
    #[error("Request cancelled: {method}")]
    Cancelled { method: String },

    /// The document changed while a request computed against it was in flight
    #[error("Content modified while {method} was in flight: {uri}")]
    ContentModified { uri: String, method: String },

    /// The configured server url cannot address a language endpoint
    #[error("Invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    /// Metadata cache failure surfaced to a caller (write path only)
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Internal failures of the metadata cache.
///
/// `Corruption` never reaches callers of `load`: it is converted to a cold cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("corrupt cache blob for {key}: {message}")]
    Corruption { key: String, message: String },

    #[error("cache storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no project cache loaded")]
    NotLoaded,
}

/// Helper trait to recover from poisoned locks with logging
pub trait LockResultExt<T> {
    /// Unwrap the guard even if a previous holder panicked.
    ///
    /// The context parameter identifies which operation triggered lock recovery.
    fn recover_poison(self, context: &str) -> T;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> T {
        match self {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!(
                    target: "editor_lsp_bridge::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                poisoned.into_inner()
            }
        }
    }
}

/// Helper functions for common error patterns
impl BridgeError {
    pub fn connection_lost(language: impl Into<String>) -> Self {
        BridgeError::ConnectionLost {
            language: language.into(),
        }
    }

    pub fn timeout(method: impl Into<String>) -> Self {
        BridgeError::Timeout {
            method: method.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        BridgeError::Protocol {
            message: message.into(),
        }
    }

    pub fn not_found(uri: impl Into<String>) -> Self {
        BridgeError::NotFound { uri: uri.into() }
    }

    pub fn already_open(uri: impl Into<String>) -> Self {
        BridgeError::DocumentAlreadyOpen { uri: uri.into() }
    }

    pub fn cancelled(method: impl Into<String>) -> Self {
        BridgeError::Cancelled {
            method: method.into(),
        }
    }

    /// Whether the failure came from the connection rather than the request itself.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionLost { .. } | BridgeError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn timeout_and_connection_lost_are_distinct() {
        let timeout = BridgeError::timeout("textDocument/formatting");
        let lost = BridgeError::connection_lost("python");

        assert!(matches!(timeout, BridgeError::Timeout { .. }));
        assert!(matches!(lost, BridgeError::ConnectionLost { .. }));
        assert_eq!(timeout.to_string(), "Request timed out: textDocument/formatting");
        assert_eq!(lost.to_string(), "Connection lost: python");
    }

    #[test]
    fn recover_poison_returns_inner_value() {
        let shared = Arc::new(Mutex::new(7));
        let cloned = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = cloned.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let guard = shared.lock().recover_poison("test");
        assert_eq!(*guard, 7);
    }
}
