//! Language server side of the bridge: connections, change delivery and diagnostics.

pub mod bridge;
mod debounced_changes;
mod diagnostic;
mod diagnostics_sink;
mod editor_bridge;

pub use diagnostic::{Diagnostic, MarkerRange, Severity};
pub use diagnostics_sink::{ApplyOutcome, DiagnosticsListener, DiagnosticsSink};
pub use editor_bridge::EditorBridge;
