//! UI-facing facade tying surface, registry, connections, diagnostics and cache together.
//!
//! Synchronous operations (`open`, `apply_edit`, `close`, `set_active`) only
//! touch local state and queue notifications; requests (`format`, `rename`)
//! are async and never hold a lock across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::bridge::{
    ConnectionManager, ConnectionState, Connector, PoolSettings, ServerNotification,
    decode_publish_diagnostics,
};
use super::debounced_changes::{ChangeSender, DebouncedChangeQueue};
use super::diagnostics_sink::DiagnosticsSink;
use crate::cache::{FileMetadataPatch, MetadataCache, file_name_of};
use crate::config::BridgeSettings;
use crate::document::{Document, DocumentRegistry, apply_text_edits};
use crate::error::{BridgeError, BridgeResult, CacheError, LockResultExt};
use crate::lsp::Diagnostic;
use crate::surface::{ContentListener, EditableSurface, ModelHandle, Subscription};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge";
const RENAME_LOG_TARGET: &str = "editor_lsp_bridge::rename";

pub struct EditorBridge {
    settings: BridgeSettings,
    registry: Arc<DocumentRegistry>,
    surface: Arc<dyn EditableSurface>,
    connections: Arc<ConnectionManager>,
    changes: Arc<DebouncedChangeQueue>,
    diagnostics: Arc<DiagnosticsSink>,
    cache: Arc<MetadataCache>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    active: Mutex<Option<String>>,
    notification_pump: JoinHandle<()>,
}

impl EditorBridge {
    /// Build a bridge. Must be called from within a tokio runtime.
    pub fn new(
        settings: BridgeSettings,
        surface: Arc<dyn EditableSurface>,
        connector: Arc<dyn Connector>,
        cache: MetadataCache,
    ) -> BridgeResult<Self> {
        let registry = Arc::new(DocumentRegistry::new());
        let (connections, notifications) = ConnectionManager::new(
            PoolSettings::from(&settings),
            connector,
            Arc::clone(&registry) as Arc<dyn super::bridge::DocumentSource>,
        )?;
        let connections = Arc::new(connections);

        let sender: ChangeSender = {
            let connections = Arc::clone(&connections);
            Arc::new(move |document: &Document| connections.did_change(document))
        };
        let runtime = tokio::runtime::Handle::current();
        let changes = Arc::new(DebouncedChangeQueue::new(
            settings.debounce,
            Arc::clone(&registry),
            sender,
            runtime.clone(),
        ));
        let diagnostics = Arc::new(DiagnosticsSink::new(
            Arc::clone(&registry),
            Arc::clone(&surface),
        ));
        let notification_pump =
            runtime.spawn(pump_notifications(notifications, Arc::clone(&diagnostics)));

        Ok(Self {
            settings,
            registry,
            surface,
            connections,
            changes,
            diagnostics,
            cache: Arc::new(cache),
            subscriptions: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            notification_pump,
        })
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn document(&self, uri: &str) -> Option<Document> {
        self.registry.get(uri)
    }

    /// Open documents in open order.
    pub fn documents(&self) -> Vec<Document> {
        self.registry.snapshot()
    }

    pub fn active_uri(&self) -> Option<String> {
        self.active.lock().recover_poison("EditorBridge::active_uri").clone()
    }

    pub fn connection_state(&self, language_id: &str) -> Option<ConnectionState> {
        self.connections.state_of(language_id)
    }

    /// Open `uri` in a new surface model and announce it to its language server.
    pub fn open(&self, uri: &str, language_id: &str, content: &str) -> BridgeResult<Document> {
        if self.registry.contains(uri) {
            return Err(BridgeError::already_open(uri));
        }

        let model = self.surface.create_model(uri, language_id, content);
        let document = match self.registry.open(uri, language_id, content, model) {
            Ok(document) => document,
            Err(err) => {
                self.surface.dispose_model(model);
                return Err(err);
            }
        };
        self.watch_model(uri, model);

        if let Err(err) = self.connections.did_open(&document) {
            log::warn!(
                target: LOG_TARGET,
                "No connection for {}: {}",
                uri,
                err
            );
        }
        self.record_in_cache(&document);

        log::debug!(target: LOG_TARGET, "Opened {} ({})", uri, language_id);
        Ok(document)
    }

    /// Replace the content of `uri` as if typed in the surface.
    ///
    /// The change goes through the regular edit path and is debounced.
    pub fn apply_edit(&self, uri: &str, content: &str) -> BridgeResult<Document> {
        let document = self
            .registry
            .get(uri)
            .ok_or_else(|| BridgeError::not_found(uri))?;
        self.surface.set_content(document.model(), content);
        self.registry
            .get(uri)
            .ok_or_else(|| BridgeError::not_found(uri))
    }

    /// Focus `uri`, or clear focus with `None`.
    ///
    /// The view state of the previously active document is saved and the
    /// saved view state of the new one is restored.
    pub fn set_active(&self, uri: Option<&str>) -> BridgeResult<()> {
        let next = match uri {
            Some(uri) => Some(
                self.registry
                    .get(uri)
                    .ok_or_else(|| BridgeError::not_found(uri))?,
            ),
            None => None,
        };

        // Surface callbacks may read `active_uri`, so the lock only guards the swap
        let previous = std::mem::replace(
            &mut *self.active.lock().recover_poison("EditorBridge::set_active"),
            next.as_ref().map(|document| document.uri().to_string()),
        );
        if let Some(previous) = previous.as_deref()
            && Some(previous) != uri
        {
            self.save_view_state(previous);
        }

        match next {
            Some(document) => {
                self.surface.set_active_model(Some(document.model()));
                if let Some(view_state) = document.view_state() {
                    self.surface.restore_view_state(document.model(), view_state);
                }
            }
            None => self.surface.set_active_model(None),
        }
        Ok(())
    }

    /// Mark `uri` as saved.
    pub fn mark_saved(&self, uri: &str) -> BridgeResult<()> {
        self.registry.mark_clean(uri)
    }

    /// Close `uri`: cancel its pending work, tell the server, dispose the model.
    ///
    /// Tears the language connection down once its last document is closed,
    /// unless `keep_connections_warm` is set.
    pub fn close(&self, uri: &str) -> BridgeResult<Document> {
        if !self.registry.contains(uri) {
            return Err(BridgeError::not_found(uri));
        }

        self.changes.cancel(uri);
        let cancelled = self.connections.cancel_requests_for(uri);
        if cancelled > 0 {
            log::debug!(
                target: LOG_TARGET,
                "Cancelled {} request(s) for closed {}",
                cancelled,
                uri
            );
        }
        self.unwatch_model(uri);

        let document = self.registry.close(uri)?;
        self.connections.did_close(document.language_id(), uri);
        self.diagnostics.clear(uri);
        self.surface.dispose_model(document.model());

        if self.replace_active_if(uri, None) {
            self.surface.set_active_model(None);
        }

        if !self.settings.keep_connections_warm
            && !self.registry.has_language(document.language_id())
        {
            self.connections
                .teardown_in_background(document.language_id());
        }

        log::debug!(target: LOG_TARGET, "Closed {}", uri);
        Ok(document)
    }

    /// Format the active document.
    pub async fn format_active(&self) -> BridgeResult<Document> {
        let uri = self.active_uri().ok_or(BridgeError::NoActiveDocument)?;
        self.format(&uri).await
    }

    /// Format `uri` through its language server and apply the edits.
    ///
    /// Pending edits are flushed first so the server formats what the user
    /// sees. If the document changes while the request is in flight the edits
    /// are discarded with `ContentModified`. On success the surface is
    /// updated and a `didChange` is sent immediately.
    pub async fn format(&self, uri: &str) -> BridgeResult<Document> {
        if !self.registry.contains(uri) {
            return Err(BridgeError::not_found(uri));
        }
        self.changes.flush_now(uri);
        let requested = self
            .registry
            .get(uri)
            .ok_or_else(|| BridgeError::not_found(uri))?;

        let edits = self
            .connections
            .formatting(&requested, self.settings.formatting)
            .await?;

        let current = self
            .registry
            .get(uri)
            .ok_or_else(|| BridgeError::cancelled("textDocument/formatting"))?;
        if current.version() != requested.version() || current.open_seq() != requested.open_seq() {
            return Err(BridgeError::ContentModified {
                uri: uri.to_string(),
                method: "textDocument/formatting".to_string(),
            });
        }
        if edits.is_empty() {
            return Ok(current);
        }

        let formatted = apply_text_edits(current.text(), &edits);
        let (updated, changed) = self.registry.apply_edit(uri, &formatted)?;
        if changed {
            self.surface.set_content(updated.model(), &formatted);
            self.connections.did_change(&updated);
        }
        log::debug!(
            target: LOG_TARGET,
            "Applied {} formatting edit(s) to {}",
            edits.len(),
            uri
        );
        Ok(self.registry.get(uri).unwrap_or(updated))
    }

    /// Rename an open document.
    ///
    /// The server is asked with `willRenameFiles` first (best effort, only
    /// while its connection is open). The local rename then happens in one
    /// step: new model, registry entry, `didClose`/`didOpen`,
    /// `didRenameFiles`, and cache migration. A cache failure is logged and
    /// leaves the cache untouched.
    pub async fn rename(&self, old_uri: &str, new_uri: &str) -> BridgeResult<Document> {
        let original = self
            .registry
            .get(old_uri)
            .ok_or_else(|| BridgeError::not_found(old_uri))?;
        if self.registry.contains(new_uri) {
            return Err(BridgeError::already_open(new_uri));
        }
        let language_id = original.language_id().to_string();

        self.changes.cancel(old_uri);
        self.connections.cancel_requests_for(old_uri);

        if self.connections.state_of(&language_id) == Some(ConnectionState::Open) {
            match self
                .connections
                .will_rename_files(&language_id, old_uri, new_uri)
                .await
            {
                Ok(Value::Null) => {}
                Ok(_) => log::debug!(
                    target: RENAME_LOG_TARGET,
                    "Ignoring workspace edit returned for {} -> {}",
                    old_uri,
                    new_uri
                ),
                Err(err) => log::warn!(
                    target: RENAME_LOG_TARGET,
                    "willRenameFiles {} -> {} failed: {}",
                    old_uri,
                    new_uri,
                    err
                ),
            }
        }

        // The document may have been closed, reopened or renamed meanwhile
        let current = self
            .registry
            .get(old_uri)
            .filter(|document| document.open_seq() == original.open_seq())
            .ok_or_else(|| BridgeError::not_found(old_uri))?;
        if self.registry.contains(new_uri) {
            return Err(BridgeError::already_open(new_uri));
        }

        let was_active = self.active_uri().as_deref() == Some(old_uri);
        if was_active {
            self.save_view_state(old_uri);
        }

        let new_model = self
            .surface
            .create_model(new_uri, &language_id, current.text());
        let renamed = match self.registry.rename(old_uri, new_uri, new_model) {
            Ok(renamed) => renamed,
            Err(err) => {
                self.surface.dispose_model(new_model);
                return Err(err);
            }
        };

        self.unwatch_model(old_uri);
        self.watch_model(new_uri, new_model);
        self.surface.dispose_model(current.model());
        self.diagnostics.clear(old_uri);

        // Focus follows only if nothing else was activated meanwhile
        if was_active && self.replace_active_if(old_uri, Some(new_uri.to_string())) {
            self.surface.set_active_model(Some(new_model));
            if let Some(view_state) = renamed.view_state() {
                self.surface.restore_view_state(new_model, view_state);
            }
        }

        self.connections.did_close(&language_id, old_uri);
        if let Err(err) = self.connections.did_open(&renamed) {
            log::warn!(
                target: RENAME_LOG_TARGET,
                "No connection for {}: {}",
                new_uri,
                err
            );
        }
        self.connections
            .did_rename_files(&language_id, old_uri, new_uri);

        match self
            .cache
            .rename_file(old_uri, new_uri, file_name_of(new_uri))
        {
            Ok(Some(metadata)) => log::debug!(
                target: RENAME_LOG_TARGET,
                "Migrated cache entry to {} (version {})",
                new_uri,
                metadata.version
            ),
            Ok(None) => {}
            Err(err) => log::warn!(
                target: RENAME_LOG_TARGET,
                "Cache migration {} -> {} failed: {}",
                old_uri,
                new_uri,
                err
            ),
        }

        log::info!(
            target: RENAME_LOG_TARGET,
            "Renamed {} -> {}",
            old_uri,
            new_uri
        );
        Ok(self.registry.get(new_uri).unwrap_or(renamed))
    }

    /// Stop all timers and close every connection gracefully.
    pub async fn shutdown(&self) {
        self.changes.cancel_all();
        self.connections.shutdown_all().await;
        self.subscriptions
            .lock()
            .recover_poison("EditorBridge::shutdown")
            .clear();
        self.notification_pump.abort();
    }

    /// Swap the active uri to `next` if it is still `expected`.
    ///
    /// Returns whether the swap happened. The lock is released before
    /// returning so callers can talk to the surface and the diagnostics sink.
    fn replace_active_if(&self, expected: &str, next: Option<String>) -> bool {
        let mut active = self
            .active
            .lock()
            .recover_poison("EditorBridge::replace_active_if");
        if active.as_deref() != Some(expected) {
            return false;
        }
        *active = next;
        true
    }

    /// Subscribe a surface content listener that feeds the edit path.
    fn watch_model(&self, uri: &str, model: ModelHandle) {
        let registry = Arc::clone(&self.registry);
        let changes = Arc::clone(&self.changes);
        let watched_uri = uri.to_string();
        let listener: ContentListener = Arc::new(move |content: &str| {
            match registry.apply_edit(&watched_uri, content) {
                Ok((_, true)) => changes.schedule(&watched_uri),
                Ok((_, false)) => {}
                Err(err) => log::debug!(
                    target: LOG_TARGET,
                    "Ignoring surface edit: {}",
                    err
                ),
            }
        });
        let subscription = self.surface.subscribe_content_change(model, listener);
        if let Some(previous) = self
            .subscriptions
            .lock()
            .recover_poison("EditorBridge::watch_model")
            .insert(uri.to_string(), subscription)
        {
            previous.dispose();
        }
    }

    fn unwatch_model(&self, uri: &str) {
        let subscription = self
            .subscriptions
            .lock()
            .recover_poison("EditorBridge::unwatch_model")
            .remove(uri);
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
    }

    fn save_view_state(&self, uri: &str) {
        let Some(document) = self.registry.get(uri) else {
            return;
        };
        let view_state = self.surface.save_view_state(document.model());
        if let Err(err) = self.registry.set_view_state(uri, view_state) {
            log::debug!(target: LOG_TARGET, "Could not save view state: {}", err);
        }
    }

    /// Create cache metadata for a newly opened file.
    fn record_in_cache(&self, document: &Document) {
        if self.cache.get_file(document.uri()).is_some() {
            return;
        }
        let patch = FileMetadataPatch {
            name: Some(file_name_of(document.uri()).to_string()),
            ..FileMetadataPatch::language(document.language_id())
        };
        match self.cache.update_file(document.uri(), patch) {
            Ok(_) | Err(CacheError::NotLoaded) => {}
            Err(err) => log::warn!(
                target: LOG_TARGET,
                "Could not record {} in metadata cache: {}",
                document.uri(),
                err
            ),
        }
    }
}

impl Drop for EditorBridge {
    fn drop(&mut self) {
        self.notification_pump.abort();
        self.changes.cancel_all();
        for language_id in self.connections.languages() {
            self.connections.teardown_in_background(&language_id);
        }
    }
}

async fn pump_notifications(
    mut notifications: mpsc::UnboundedReceiver<ServerNotification>,
    diagnostics: Arc<DiagnosticsSink>,
) {
    while let Some(notification) = notifications.recv().await {
        handle_server_notification(&diagnostics, notification);
    }
}

fn handle_server_notification(diagnostics: &DiagnosticsSink, notification: ServerNotification) {
    let ServerNotification {
        language_id,
        method,
        params,
    } = notification;

    match method.as_str() {
        "textDocument/publishDiagnostics" => match decode_publish_diagnostics(params) {
            Ok(published) => {
                let markers: Vec<Diagnostic> =
                    published.diagnostics.iter().map(Diagnostic::from).collect();
                diagnostics.apply(&published.uri, published.version, markers);
            }
            Err(err) => log::warn!(
                target: LOG_TARGET,
                "Dropping diagnostics from {}: {}",
                language_id,
                err
            ),
        },
        "window/logMessage" | "window/showMessage" => {
            let message = params
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let level = match params.get("type").and_then(Value::as_u64) {
                Some(1) => log::Level::Error,
                Some(2) => log::Level::Warn,
                Some(3) => log::Level::Info,
                _ => log::Level::Debug,
            };
            log::log!(target: LOG_TARGET, level, "[{}] {}", language_id, message);
        }
        _ => log::trace!(
            target: LOG_TARGET,
            "Ignoring {} from {}",
            method,
            language_id
        ),
    }
}
