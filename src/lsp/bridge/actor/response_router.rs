//! Response routing for pending requests.
//!
//! The ResponseRouter tracks in-flight requests and delivers responses to
//! their waiters via oneshot channels:
//! - Before sending a request, register it via `register()` to get a Receiver
//! - The reader task calls `route()` when a response arrives
//! - The requester awaits the Receiver without holding any lock

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::oneshot;

use super::super::protocol::RequestId;
use crate::error::LockResultExt;

/// What a waiter receives for its request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RouteOutcome {
    /// The full response envelope
    Response(serde_json::Value),
    /// The session ended before a response arrived
    ConnectionLost,
    /// The request was abandoned locally (document closed or renamed)
    Cancelled,
}

struct PendingRequest {
    method: String,
    created_at: Instant,
    /// Document uri the request was issued for, if any
    tag: Option<String>,
    sender: oneshot::Sender<RouteOutcome>,
}

/// Routes responses to pending requests via oneshot channels.
///
/// A response resolves exactly one pending entry; responses for ids that are
/// no longer pending (timed out, cancelled) are dropped.
pub(crate) struct ResponseRouter {
    pending: std::sync::Mutex<HashMap<RequestId, PendingRequest>>,
}

impl ResponseRouter {
    pub(crate) fn new() -> Self {
        Self {
            pending: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending request and return a receiver for its outcome.
    ///
    /// Returns `None` if a request with this ID is already pending.
    pub(crate) fn register(
        &self,
        id: RequestId,
        method: &str,
        tag: Option<&str>,
    ) -> Option<oneshot::Receiver<RouteOutcome>> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().recover_poison("ResponseRouter::register");

        if pending.contains_key(&id) {
            return None;
        }

        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                created_at: Instant::now(),
                tag: tag.map(str::to_string),
                sender: tx,
            },
        );
        Some(rx)
    }

    /// Route a response to its pending request.
    ///
    /// Returns `true` if the response was delivered, `false` otherwise.
    pub(crate) fn route(&self, id: RequestId, response: serde_json::Value) -> bool {
        let entry = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::route")
            .remove(&id);

        match entry {
            Some(entry) => {
                log::trace!(
                    target: "editor_lsp_bridge::bridge",
                    "{} #{} answered after {:?}",
                    entry.method,
                    id,
                    entry.created_at.elapsed()
                );
                entry.sender.send(RouteOutcome::Response(response)).is_ok()
            }
            None => false,
        }
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::pending_count")
            .len()
    }

    /// Remove a pending request without completing it.
    ///
    /// Used when the request could not be sent or its waiter gave up.
    pub(crate) fn remove(&self, id: RequestId) -> bool {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::remove")
            .remove(&id)
            .is_some()
    }

    /// Complete every request tagged with `tag` as cancelled.
    ///
    /// Returns the cancelled ids so the caller can notify the server.
    pub(crate) fn cancel_tagged(&self, tag: &str) -> Vec<RequestId> {
        let cancelled: Vec<(RequestId, PendingRequest)> = {
            let mut pending = self
                .pending
                .lock()
                .recover_poison("ResponseRouter::cancel_tagged");
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, entry)| entry.tag.as_deref() == Some(tag))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        cancelled
            .into_iter()
            .map(|(id, entry)| {
                log::debug!(
                    target: "editor_lsp_bridge::bridge",
                    "Cancelling {} #{} for {}",
                    entry.method,
                    id,
                    tag
                );
                let _ = entry.sender.send(RouteOutcome::Cancelled);
                id
            })
            .collect()
    }

    /// Fail all pending requests with `ConnectionLost`.
    ///
    /// Called when a session ends so every waiter is released.
    pub(crate) fn fail_all(&self) {
        let entries: Vec<PendingRequest> = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::fail_all")
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in entries {
            let _ = entry.sender.send(RouteOutcome::ConnectionLost);
        }
    }
}
