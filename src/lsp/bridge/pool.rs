//! Connection pool: one supervised connection per language.
//!
//! [`ConnectionManager`] lazily creates a [`LanguageConnection`] the first
//! time a language is needed and tears it down on request. Each connection
//! is driven by its own supervisor task (connect, handshake, replay, and
//! reconnect with capped exponential backoff).

mod backoff;
mod connection_handle;
mod connection_state;
mod handshake;
mod shutdown;
mod supervisor;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use connection_handle::{LanguageConnection, NotificationSendResult};
pub use connection_state::ConnectionState;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use self::supervisor::SupervisorContext;
use super::transport::Connector;
use crate::config::{BridgeSettings, ReconnectSettings};
use crate::document::{Document, DocumentRegistry};
use crate::error::{BridgeError, BridgeResult, LockResultExt};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge";

/// Read access to open documents plus sync bookkeeping.
///
/// Connections replay `didOpen` from it after every handshake and report
/// each version that reached the server.
pub trait DocumentSource: Send + Sync {
    /// Open documents of a language in open order.
    fn documents_for_language(&self, language_id: &str) -> Vec<Document>;

    /// Record that `version` of `uri` was sent.
    fn mark_synced(&self, uri: &str, version: i32);
}

impl DocumentSource for DocumentRegistry {
    fn documents_for_language(&self, language_id: &str) -> Vec<Document> {
        DocumentRegistry::documents_for_language(self, language_id)
    }

    fn mark_synced(&self, uri: &str, version: i32) {
        DocumentRegistry::mark_synced(self, uri, version)
    }
}

/// A notification pushed by a language server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotification {
    pub language_id: String,
    pub method: String,
    pub params: Value,
}

/// Pool-level subset of [`BridgeSettings`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub server_url: String,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub reconnect: ReconnectSettings,
    /// Sent as `rootUri` in `initialize`
    pub root_uri: Option<String>,
}

impl From<&BridgeSettings> for PoolSettings {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            server_url: settings.server_url.clone(),
            request_timeout: settings.request_timeout,
            shutdown_timeout: settings.shutdown_timeout,
            reconnect: settings.reconnect,
            root_uri: settings.root_uri.clone(),
        }
    }
}

/// Owner of all language connections.
pub struct ConnectionManager {
    settings: PoolSettings,
    connector: Arc<dyn Connector>,
    documents: Arc<dyn DocumentSource>,
    connections: std::sync::Mutex<HashMap<String, Arc<LanguageConnection>>>,
    notifications: mpsc::UnboundedSender<ServerNotification>,
    runtime: tokio::runtime::Handle,
}

impl ConnectionManager {
    /// Create a manager and the stream of server notifications.
    ///
    /// Must be called from within a tokio runtime; supervisors are spawned
    /// on it.
    pub fn new(
        settings: PoolSettings,
        connector: Arc<dyn Connector>,
        documents: Arc<dyn DocumentSource>,
    ) -> BridgeResult<(Self, mpsc::UnboundedReceiver<ServerNotification>)> {
        validate_server_url(&settings.server_url)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| {
            BridgeError::Io(std::io::Error::other(format!(
                "connection manager needs a tokio runtime: {}",
                err
            )))
        })?;
        let (notifications, receiver) = mpsc::unbounded_channel();

        Ok((
            Self {
                settings,
                connector,
                documents,
                connections: std::sync::Mutex::new(HashMap::new()),
                notifications,
                runtime,
            },
            receiver,
        ))
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// `{server_url}/lsp/{language_id}`
    pub fn endpoint_for(&self, language_id: &str) -> BridgeResult<String> {
        if language_id.is_empty() || language_id.contains(['/', '?', '#']) {
            return Err(BridgeError::InvalidEndpoint {
                message: format!("language id {:?} cannot be used in a path", language_id),
            });
        }
        let endpoint = format!(
            "{}/lsp/{}",
            self.settings.server_url.trim_end_matches('/'),
            language_id
        );
        validate_server_url(&endpoint)?;
        Ok(endpoint)
    }

    /// Return the connection for `language_id`, creating and starting it if needed.
    ///
    /// Never blocks on the network: the supervisor connects in the background.
    pub fn get_or_create(&self, language_id: &str) -> BridgeResult<Arc<LanguageConnection>> {
        let mut connections = self
            .connections
            .lock()
            .recover_poison("ConnectionManager::get_or_create");

        if let Some(connection) = connections.get(language_id) {
            return Ok(Arc::clone(connection));
        }

        let endpoint = self.endpoint_for(language_id)?;
        log::info!(
            target: LOG_TARGET,
            "Creating {} connection to {}",
            language_id,
            endpoint
        );
        let connection = Arc::new(LanguageConnection::new(
            language_id,
            endpoint,
            Arc::clone(&self.documents),
            self.settings.request_timeout,
        ));
        let handle = self.runtime.spawn(supervisor::run(
            Arc::clone(&connection),
            SupervisorContext {
                connector: Arc::clone(&self.connector),
                notifications: self.notifications.clone(),
                reconnect: self.settings.reconnect,
                shutdown_timeout: self.settings.shutdown_timeout,
                root_uri: self.settings.root_uri.clone(),
            },
        ));
        connection.set_supervisor(handle);
        connections.insert(language_id.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    pub fn get(&self, language_id: &str) -> Option<Arc<LanguageConnection>> {
        self.connections
            .lock()
            .recover_poison("ConnectionManager::get")
            .get(language_id)
            .cloned()
    }

    /// Languages with a live (not yet torn down) connection.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self
            .connections
            .lock()
            .recover_poison("ConnectionManager::languages")
            .keys()
            .cloned()
            .collect();
        languages.sort();
        languages
    }

    pub fn state_of(&self, language_id: &str) -> Option<ConnectionState> {
        self.get(language_id).map(|connection| connection.state())
    }

    /// Send a request to the server of `language_id`.
    pub async fn send_request(
        &self,
        language_id: &str,
        method: &str,
        params: Value,
        tag: Option<&str>,
    ) -> BridgeResult<Value> {
        let connection = self.get_or_create(language_id)?;
        connection.request(method, params, tag).await
    }

    /// Send a notification to the server of `language_id`.
    ///
    /// Does not create connections: a notification for a language without
    /// one is dropped like any other notification sent while not Open.
    pub fn send_notification(
        &self,
        language_id: &str,
        method: &str,
        params: Value,
    ) -> NotificationSendResult {
        match self.get(language_id) {
            Some(connection) => connection.notify(method, params),
            None => NotificationSendResult::NotOpen,
        }
    }

    /// Cancel in-flight requests tagged with `uri` on every connection.
    pub fn cancel_requests_for(&self, uri: &str) -> usize {
        let connections: Vec<Arc<LanguageConnection>> = self
            .connections
            .lock()
            .recover_poison("ConnectionManager::cancel_requests_for")
            .values()
            .cloned()
            .collect();
        connections
            .iter()
            .map(|connection| connection.cancel_requests_for(uri))
            .sum()
    }

    /// Remove the connection of `language_id` and wait until it is Closed.
    pub async fn teardown(&self, language_id: &str) {
        let removed = self
            .connections
            .lock()
            .recover_poison("ConnectionManager::teardown")
            .remove(language_id);

        if let Some(connection) = removed {
            log::info!(
                target: LOG_TARGET,
                "Tearing down {} connection",
                language_id
            );
            connection.teardown().await;
        }
    }

    /// Like [`teardown`](Self::teardown) without waiting for completion.
    pub fn teardown_in_background(&self, language_id: &str) {
        let removed = self
            .connections
            .lock()
            .recover_poison("ConnectionManager::teardown_in_background")
            .remove(language_id);

        if let Some(connection) = removed {
            log::info!(
                target: LOG_TARGET,
                "Tearing down {} connection",
                language_id
            );
            self.runtime.spawn(async move { connection.teardown().await });
        }
    }

    fn drain_connections(&self) -> Vec<(String, Arc<LanguageConnection>)> {
        self.connections
            .lock()
            .recover_poison("ConnectionManager::drain_connections")
            .drain()
            .collect()
    }
}

fn validate_server_url(url: &str) -> BridgeResult<()> {
    let parsed = Url::parse(url).map_err(|err| BridgeError::InvalidEndpoint {
        message: format!("{}: {}", url, err),
    })?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        scheme => Err(BridgeError::InvalidEndpoint {
            message: format!("{}: unsupported scheme {}", url, scheme),
        }),
    }
}
