//! Pushed diagnostics, gated by document identity and version.
//!
//! Each publish fully replaces the markers of its document. A publish is
//! discarded when its uri is not open, or when it reports a version older
//! than the last version sent to the server for that document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::document::DocumentRegistry;
use crate::error::LockResultExt;
use crate::lsp::Diagnostic;
use crate::surface::{EditableSurface, Subscription};

const LOG_TARGET: &str = "editor_lsp_bridge::diagnostics";

/// Outcome of [`DiagnosticsSink::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Markers replaced with this many diagnostics
    Applied(usize),
    UnknownDocument,
    Stale,
}

/// Called with the uri and the new full set of diagnostics.
pub type DiagnosticsListener = Arc<dyn Fn(&str, &[Diagnostic]) + Send + Sync>;

type Listeners = Mutex<Vec<(u64, DiagnosticsListener)>>;

pub struct DiagnosticsSink {
    registry: Arc<DocumentRegistry>,
    surface: Arc<dyn EditableSurface>,
    markers: Mutex<HashMap<String, Vec<Diagnostic>>>,
    listeners: Arc<Listeners>,
    next_listener: AtomicU64,
}

impl DiagnosticsSink {
    pub fn new(registry: Arc<DocumentRegistry>, surface: Arc<dyn EditableSurface>) -> Self {
        Self {
            registry,
            surface,
            markers: Mutex::new(HashMap::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Apply a diagnostics batch for `uri`.
    ///
    /// `version` is the document version the server computed the
    /// diagnostics for, when it reports one.
    pub fn apply(
        &self,
        uri: &str,
        version: Option<i32>,
        diagnostics: Vec<Diagnostic>,
    ) -> ApplyOutcome {
        let Some(document) = self.registry.get(uri) else {
            log::debug!(
                target: LOG_TARGET,
                "Discarding diagnostics for unknown document {}",
                uri
            );
            return ApplyOutcome::UnknownDocument;
        };

        if let (Some(reported), Some(sent)) = (version, document.last_sent_version())
            && reported < sent
        {
            log::debug!(
                target: LOG_TARGET,
                "Discarding stale diagnostics for {} (version {} < {})",
                uri,
                reported,
                sent
            );
            return ApplyOutcome::Stale;
        }

        let count = diagnostics.len();
        self.surface.set_markers(document.model(), &diagnostics);
        self.markers
            .lock()
            .recover_poison("DiagnosticsSink::apply")
            .insert(uri.to_string(), diagnostics.clone());
        self.notify(uri, &diagnostics);

        log::debug!(
            target: LOG_TARGET,
            "Applied {} diagnostic(s) to {}",
            count,
            uri
        );
        ApplyOutcome::Applied(count)
    }

    /// Forget the markers of `uri` (document closed or renamed away).
    pub fn clear(&self, uri: &str) {
        let removed = self
            .markers
            .lock()
            .recover_poison("DiagnosticsSink::clear")
            .remove(uri);
        if removed.is_some_and(|markers| !markers.is_empty()) {
            self.notify(uri, &[]);
        }
    }

    /// Current markers of `uri`.
    pub fn markers(&self, uri: &str) -> Vec<Diagnostic> {
        self.markers
            .lock()
            .recover_poison("DiagnosticsSink::markers")
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    /// Observe every applied batch. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, listener: DiagnosticsListener) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .recover_poison("DiagnosticsSink::subscribe")
            .push((id, listener));

        let listeners: Weak<Listeners> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .lock()
                    .recover_poison("DiagnosticsSink::unsubscribe")
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    fn notify(&self, uri: &str, diagnostics: &[Diagnostic]) {
        // Snapshot so listeners may subscribe or unsubscribe re-entrantly
        let listeners: Vec<DiagnosticsListener> = self
            .listeners
            .lock()
            .recover_poison("DiagnosticsSink::notify")
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(uri, diagnostics);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::{MarkerRange, Severity};
    use crate::surface::MemorySurface;

    fn diagnostic(message: &str) -> Diagnostic {
        Diagnostic::new(
            MarkerRange {
                start_line: 0,
                start_col: 0,
                end_line: 0,
                end_col: 1,
            },
            message,
            Severity::Error,
        )
    }

    fn sink_with_document() -> (DiagnosticsSink, Arc<DocumentRegistry>, Arc<MemorySurface>) {
        let registry = Arc::new(DocumentRegistry::new());
        let surface = Arc::new(MemorySurface::new());
        let model = surface.create_model("file:///a.js", "javascript", "let a");
        registry
            .open("file:///a.js", "javascript", "let a", model)
            .unwrap();
        let sink = DiagnosticsSink::new(
            Arc::clone(&registry),
            Arc::clone(&surface) as Arc<dyn EditableSurface>,
        );
        (sink, registry, surface)
    }

    #[test]
    fn unknown_document_is_a_no_op() {
        let (sink, _registry, _surface) = sink_with_document();

        let outcome = sink.apply("file:///missing.js", Some(1), vec![diagnostic("x")]);

        assert_eq!(outcome, ApplyOutcome::UnknownDocument);
        assert!(sink.markers("file:///missing.js").is_empty());
    }

    #[test]
    fn publish_replaces_rather_than_merges() {
        let (sink, registry, surface) = sink_with_document();
        let model = registry.get("file:///a.js").unwrap().model();

        sink.apply("file:///a.js", None, vec![diagnostic("one"), diagnostic("two")]);
        let outcome = sink.apply("file:///a.js", None, vec![diagnostic("three")]);

        assert_eq!(outcome, ApplyOutcome::Applied(1));
        assert_eq!(sink.markers("file:///a.js"), vec![diagnostic("three")]);
        assert_eq!(surface.markers(model), vec![diagnostic("three")]);
    }

    #[test]
    fn older_version_than_last_sent_is_stale() {
        let (sink, registry, surface) = sink_with_document();
        let model = registry.get("file:///a.js").unwrap().model();
        registry.apply_edit("file:///a.js", "let ab").unwrap();
        registry.mark_synced("file:///a.js", 2);

        assert_eq!(
            sink.apply("file:///a.js", Some(1), vec![diagnostic("old")]),
            ApplyOutcome::Stale
        );
        assert!(surface.markers(model).is_empty());
        assert_eq!(
            sink.apply("file:///a.js", Some(2), vec![diagnostic("new")]),
            ApplyOutcome::Applied(1)
        );
        assert_eq!(
            sink.apply("file:///a.js", None, vec![]),
            ApplyOutcome::Applied(0)
        );
    }

    #[test]
    fn subscribers_see_batches_until_disposed() {
        let (sink, _registry, _surface) = sink_with_document();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let subscription = sink.subscribe(Arc::new(move |uri: &str, diagnostics: &[Diagnostic]| {
            log.lock().unwrap().push((uri.to_string(), diagnostics.len()));
        }));

        sink.apply("file:///a.js", None, vec![diagnostic("a")]);
        sink.clear("file:///a.js");
        subscription.dispose();
        sink.apply("file:///a.js", None, vec![diagnostic("b")]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("file:///a.js".to_string(), 1), ("file:///a.js".to_string(), 0)]
        );
    }
}
