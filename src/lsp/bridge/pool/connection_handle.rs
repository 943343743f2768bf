//! Per-language connection: state, session and request correlation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, DocumentSource};
use crate::error::{BridgeError, BridgeResult, LockResultExt};
use crate::lsp::bridge::actor::{ResponseRouter, RouteOutcome};
use crate::lsp::bridge::protocol::{
    RequestId, build_notification, build_request, cancel_params, decode_response,
    did_open_params,
};

const LOG_TARGET: &str = "editor_lsp_bridge::bridge";

pub(crate) const CANCEL_REQUEST_METHOD: &str = "$/cancelRequest";

/// Result of queueing a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSendResult {
    Queued,
    /// The connection is not open; the notification was dropped
    NotOpen,
    /// The outbound queue is full; the notification was dropped
    QueueFull,
    /// The transport went away; the notification was dropped
    ChannelClosed,
}

impl NotificationSendResult {
    pub fn is_queued(self) -> bool {
        self == NotificationSendResult::Queued
    }
}

/// The live transport session of a connection.
///
/// `synced` holds the uris that received `didOpen` in this session with the
/// last version sent for each. It is cleared whenever the session ends.
#[derive(Default)]
pub(crate) struct Session {
    outbound: Option<mpsc::Sender<String>>,
    synced: HashMap<String, i32>,
}

impl Session {
    pub(crate) fn send_notification(&self, method: &str, params: Value) -> NotificationSendResult {
        let Some(outbound) = self.outbound.as_ref() else {
            return NotificationSendResult::NotOpen;
        };
        queue_frame(outbound, build_notification(method, params).to_string(), method)
    }

    pub(crate) fn synced_version(&self, uri: &str) -> Option<i32> {
        self.synced.get(uri).copied()
    }

    pub(crate) fn record_synced(&mut self, uri: &str, version: i32) {
        self.synced.insert(uri.to_string(), version);
    }

    pub(crate) fn forget(&mut self, uri: &str) -> bool {
        self.synced.remove(uri).is_some()
    }
}

fn queue_frame(
    outbound: &mpsc::Sender<String>,
    frame: String,
    method: &str,
) -> NotificationSendResult {
    match outbound.try_send(frame) {
        Ok(()) => NotificationSendResult::Queued,
        Err(mpsc::error::TrySendError::Full(_)) => {
            log::warn!(
                target: LOG_TARGET,
                "Outbound queue full, dropping {}",
                method
            );
            NotificationSendResult::QueueFull
        }
        Err(mpsc::error::TrySendError::Closed(_)) => NotificationSendResult::ChannelClosed,
    }
}

/// One logical connection to the language server of a language.
///
/// Survives transport sessions: the supervisor task replaces the session on
/// reconnect, while request ids keep increasing so that they stay unique for
/// the whole lifetime of the connection.
pub struct LanguageConnection {
    language_id: String,
    endpoint: String,
    state: watch::Sender<ConnectionState>,
    router: Arc<ResponseRouter>,
    next_request_id: AtomicI64,
    session: std::sync::Mutex<Session>,
    documents: Arc<dyn DocumentSource>,
    request_timeout: Duration,
    cancel: CancellationToken,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LanguageConnection {
    pub(super) fn new(
        language_id: &str,
        endpoint: String,
        documents: Arc<dyn DocumentSource>,
        request_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            language_id: language_id.to_string(),
            endpoint,
            state,
            router: Arc::new(ResponseRouter::new()),
            next_request_id: AtomicI64::new(1),
            session: std::sync::Mutex::new(Session::default()),
            documents,
            request_timeout,
            cancel: CancellationToken::new(),
            supervisor: std::sync::Mutex::new(None),
        }
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn pending_requests(&self) -> usize {
        self.router.pending_count()
    }

    /// Version last sent for `uri` in the current session, if it was opened.
    pub fn synced_version(&self, uri: &str) -> Option<i32> {
        self.lock_session().synced_version(uri)
    }

    pub(crate) fn router(&self) -> Arc<ResponseRouter> {
        Arc::clone(&self.router)
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn documents(&self) -> &dyn DocumentSource {
        self.documents.as_ref()
    }

    pub(super) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId::new(self.next_request_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session
            .lock()
            .recover_poison("LanguageConnection::session")
    }

    /// Move to `next`. Closed is terminal and never left.
    pub(super) fn set_state(&self, next: ConnectionState) {
        let language_id = &self.language_id;
        self.state.send_if_modified(|current| {
            if *current == next || current.is_terminal() {
                return false;
            }
            log::debug!(
                target: LOG_TARGET,
                "{} connection: {} -> {}",
                language_id,
                current,
                next
            );
            *current = next;
            true
        });
    }

    /// Install a fresh session after the handshake.
    ///
    /// Every open document of this language is sent a `didOpen` in open
    /// order before the connection becomes Open. Both happen under the
    /// session lock, so a concurrent open either is part of the replay or
    /// observes Open and sends its own `didOpen`, never both.
    pub(super) fn open_session(&self, outbound: mpsc::Sender<String>) {
        let mut session = self.lock_session();
        session.synced.clear();

        for document in self.documents.documents_for_language(&self.language_id) {
            let params = did_open_params(
                document.uri(),
                document.language_id(),
                document.version(),
                document.text(),
            );
            let frame = build_notification("textDocument/didOpen", params).to_string();
            if queue_frame(&outbound, frame, "textDocument/didOpen").is_queued() {
                session.record_synced(document.uri(), document.version());
                self.documents.mark_synced(document.uri(), document.version());
            }
        }

        let replayed = session.synced.len();
        session.outbound = Some(outbound);
        self.set_state(ConnectionState::Open);
        drop(session);

        log::info!(
            target: LOG_TARGET,
            "{} connection open ({} document(s) replayed)",
            self.language_id,
            replayed
        );
    }

    /// Drop the current session and release every pending request.
    pub(super) fn end_session(&self, next: ConnectionState) {
        {
            let mut session = self.lock_session();
            self.set_state(next);
            session.outbound = None;
            session.synced.clear();
        }
        self.router.fail_all();
    }

    /// Run `f` against the session if the connection is Open.
    pub(crate) fn with_open_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut session = self.lock_session();
        if !self.state().is_open() || session.outbound.is_none() {
            return None;
        }
        Some(f(&mut session))
    }

    /// Send a notification. Dropped (with a debug log) while not Open.
    pub fn notify(&self, method: &str, params: Value) -> NotificationSendResult {
        let result = self
            .with_open_session(|session| session.send_notification(method, params))
            .unwrap_or(NotificationSendResult::NotOpen);
        if result == NotificationSendResult::NotOpen {
            log::debug!(
                target: LOG_TARGET,
                "{} connection not open, dropping {}",
                self.language_id,
                method
            );
        }
        result
    }

    /// Wait until the connection is Open. Fails once it is Closed.
    async fn wait_open(&self) -> BridgeResult<()> {
        let mut state = self.state.subscribe();
        loop {
            match *state.borrow_and_update() {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closed => {
                    return Err(BridgeError::connection_lost(&self.language_id));
                }
                _ => {}
            }
            if state.changed().await.is_err() {
                return Err(BridgeError::connection_lost(&self.language_id));
            }
        }
    }

    /// Send a request and wait for its result.
    ///
    /// Waiting for the connection to open and waiting for the response share
    /// one request-timeout budget. `tag` associates the request with a
    /// document uri so that closing the document cancels it.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        tag: Option<&str>,
    ) -> BridgeResult<Value> {
        let deadline = Instant::now() + self.request_timeout;
        let mut params = Some(params);

        loop {
            match timeout_at(deadline, self.wait_open()).await {
                Err(_) => return Err(BridgeError::timeout(method)),
                Ok(result) => result?,
            }

            let queued = {
                let session = self.lock_session();
                match session.outbound.as_ref() {
                    Some(outbound) if self.state().is_open() => {
                        let params = params.take().unwrap_or(Value::Null);
                        Some(self.queue_request(outbound, method, params, tag)?)
                    }
                    // Session ended between the wait and the lock; wait again
                    _ => None,
                }
            };

            if let Some((id, rx)) = queued {
                let envelope = self.await_response(id, method, rx, deadline).await?;
                return decode_response(envelope);
            }
        }
    }

    /// Send a request on a specific session regardless of connection state.
    ///
    /// Used for the lifecycle handshake. Returns the raw response envelope.
    pub(super) async fn exchange_on(
        &self,
        outbound: &mpsc::Sender<String>,
        method: &str,
        params: Value,
        deadline: Instant,
    ) -> BridgeResult<Value> {
        let (id, rx) = self.queue_request(outbound, method, params, None)?;
        self.await_response(id, method, rx, deadline).await
    }

    fn queue_request(
        &self,
        outbound: &mpsc::Sender<String>,
        method: &str,
        params: Value,
        tag: Option<&str>,
    ) -> BridgeResult<(RequestId, oneshot::Receiver<RouteOutcome>)> {
        let id = self.next_request_id();
        let rx = self
            .router
            .register(id, method, tag)
            .ok_or_else(|| BridgeError::protocol(format!("duplicate request id {}", id)))?;

        match outbound.try_send(build_request(id, method, params).to_string()) {
            Ok(()) => Ok((id, rx)),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.router.remove(id);
                Err(BridgeError::Io(std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    format!("outbound queue full, dropping {}", method),
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.router.remove(id);
                Err(BridgeError::connection_lost(&self.language_id))
            }
        }
    }

    async fn await_response(
        &self,
        id: RequestId,
        method: &str,
        rx: oneshot::Receiver<RouteOutcome>,
        deadline: Instant,
    ) -> BridgeResult<Value> {
        let mut guard = PendingGuard {
            router: &self.router,
            id,
            armed: true,
        };

        let outcome = timeout_at(deadline, rx).await;
        guard.armed = false;

        match outcome {
            Err(_) => {
                if self.router.remove(id) {
                    self.notify(CANCEL_REQUEST_METHOD, cancel_params(id));
                }
                log::warn!(
                    target: LOG_TARGET,
                    "{} #{} to {} timed out",
                    method,
                    id,
                    self.language_id
                );
                Err(BridgeError::timeout(method))
            }
            Ok(Err(_)) | Ok(Ok(RouteOutcome::ConnectionLost)) => {
                Err(BridgeError::connection_lost(&self.language_id))
            }
            Ok(Ok(RouteOutcome::Cancelled)) => Err(BridgeError::cancelled(method)),
            Ok(Ok(RouteOutcome::Response(envelope))) => Ok(envelope),
        }
    }

    /// Cancel every in-flight request tagged with `uri`.
    ///
    /// Waiters see `Cancelled`; the server is sent `$/cancelRequest` and its
    /// late responses are dropped.
    pub fn cancel_requests_for(&self, uri: &str) -> usize {
        let cancelled = self.router.cancel_tagged(uri);
        for id in &cancelled {
            self.notify(CANCEL_REQUEST_METHOD, cancel_params(*id));
        }
        cancelled.len()
    }

    pub(super) fn set_supervisor(&self, handle: JoinHandle<()>) {
        *self
            .supervisor
            .lock()
            .recover_poison("LanguageConnection::set_supervisor") = Some(handle);
    }

    /// Stop the supervisor and wait until the connection is Closed.
    pub(super) async fn teardown(&self) {
        self.cancel.cancel();
        let supervisor = self
            .supervisor
            .lock()
            .recover_poison("LanguageConnection::teardown")
            .take();

        if let Some(handle) = supervisor
            && let Err(err) = handle.await
        {
            log::error!(
                target: LOG_TARGET,
                "{} supervisor panicked: {}",
                self.language_id,
                err
            );
        }
        self.end_session(ConnectionState::Closed);
    }
}

/// Removes a pending entry if the waiting future is dropped early.
struct PendingGuard<'a> {
    router: &'a ResponseRouter,
    id: RequestId,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.router.remove(self.id);
        }
    }
}
