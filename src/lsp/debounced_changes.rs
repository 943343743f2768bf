//! Debounced `didChange` delivery.
//!
//! Rapid edits to a document are coalesced: each edit restarts the
//! document's timer, and when the timer expires the latest content in the
//! registry is sent as a single `didChange`.
//!
//! ```text
//! edit ──► schedule(uri) ──► abort previous timer ──► spawn timer
//!                                                        │
//!                                       sleep(debounce) ─┤
//!                                                        ▼
//!                              registry.get(uri) ──► send latest content
//! ```
//!
//! The content is read when the timer fires, not when it is scheduled, so
//! only the newest version ever goes out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use crate::document::{Document, DocumentRegistry};

/// Logging target for debounced changes.
const LOG_TARGET: &str = "editor_lsp_bridge::debounce";

/// Delivers one document's latest content. Returns whether it was sent.
pub(crate) type ChangeSender = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

struct Timer {
    generation: u64,
    handle: AbortHandle,
}

/// Per-document debounce timers.
///
/// Uses `DashMap` so edits on different documents never contend.
pub(crate) struct DebouncedChangeQueue {
    active_timers: Arc<DashMap<String, Timer>>,
    debounce_duration: Duration,
    registry: Arc<DocumentRegistry>,
    sender: ChangeSender,
    runtime: tokio::runtime::Handle,
    generation: AtomicU64,
}

impl DebouncedChangeQueue {
    pub(crate) fn new(
        debounce_duration: Duration,
        registry: Arc<DocumentRegistry>,
        sender: ChangeSender,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            active_timers: Arc::new(DashMap::new()),
            debounce_duration,
            registry,
            sender,
            runtime,
            generation: AtomicU64::new(0),
        }
    }

    /// Restart the debounce timer of `uri`.
    ///
    /// Safe to call from any thread; the timer runs on the runtime captured
    /// at construction.
    pub(crate) fn schedule(&self, uri: &str) {
        if let Some((_, previous)) = self.active_timers.remove(uri) {
            previous.handle.abort();
            log::trace!(
                target: LOG_TARGET,
                "Restarted debounce timer for {}",
                uri
            );
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let duration = self.debounce_duration;
        let timers = Arc::clone(&self.active_timers);
        let registry = Arc::clone(&self.registry);
        let sender = Arc::clone(&self.sender);
        let timer_uri = uri.to_string();

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;

            timers.remove_if(&timer_uri, |_, timer| timer.generation == generation);
            log::debug!(
                target: LOG_TARGET,
                "Debounce timer expired for {}",
                timer_uri
            );
            send_latest(&registry, &sender, &timer_uri);
        });

        self.active_timers.insert(
            uri.to_string(),
            Timer {
                generation,
                handle: task.abort_handle(),
            },
        );
    }

    /// Send pending content of `uri` right away instead of waiting.
    ///
    /// Returns whether a `didChange` was sent.
    pub(crate) fn flush_now(&self, uri: &str) -> bool {
        self.cancel(uri);
        send_latest(&self.registry, &self.sender, uri)
    }

    /// Drop the timer of `uri` without sending.
    pub(crate) fn cancel(&self, uri: &str) {
        if let Some((_, timer)) = self.active_timers.remove(uri) {
            timer.handle.abort();
            log::trace!(
                target: LOG_TARGET,
                "Cancelled debounce timer for {}",
                uri
            );
        }
    }

    /// Cancel all active debounce timers.
    pub(crate) fn cancel_all(&self) {
        for entry in self.active_timers.iter() {
            entry.value().handle.abort();
        }
        self.active_timers.clear();
        log::debug!(
            target: LOG_TARGET,
            "Cancelled all debounce timers"
        );
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self, uri: &str) -> bool {
        self.active_timers.contains_key(uri)
    }
}

fn send_latest(registry: &DocumentRegistry, sender: &ChangeSender, uri: &str) -> bool {
    let Some(document) = registry.get(uri) else {
        return false;
    };
    if !document.has_unsent_changes() {
        return false;
    }
    sender(&document)
}
