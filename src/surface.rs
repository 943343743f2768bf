//! Capability interface over the host-provided editor control.
//!
//! The bridge never talks to a concrete editor widget. Everything it needs
//! (models, content, change notifications, view state, markers) goes
//! through [`EditableSurface`], so the same bridge logic drives a browser
//! editor, a terminal editor or the headless [`MemorySurface`].

mod memory;
mod subscription;

pub use memory::MemorySurface;
pub use subscription::Subscription;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::lsp::Diagnostic;

/// Opaque handle to a model (text buffer) owned by the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Cursor and scroll position of a model, saved when it loses focus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub cursor_line: u32,
    pub cursor_column: u32,
    pub scroll_top: u32,
}

/// Callback invoked with the full new content after every content change.
pub type ContentListener = Arc<dyn Fn(&str) + Send + Sync>;

/// What the bridge needs from the embedded editor.
///
/// Implementations must not hold internal locks while invoking listeners:
/// a listener may call back into the surface.
pub trait EditableSurface: Send + Sync {
    /// Create a model for `uri` holding `content`.
    fn create_model(&self, uri: &str, language_id: &str, content: &str) -> ModelHandle;

    /// Dispose a model. Listeners of the model are dropped.
    fn dispose_model(&self, model: ModelHandle);

    fn content(&self, model: ModelHandle) -> Option<String>;

    /// Replace the model content and notify content listeners.
    fn set_content(&self, model: ModelHandle, content: &str);

    /// Subscribe to content changes. Dropping or disposing the returned
    /// [`Subscription`] unsubscribes.
    fn subscribe_content_change(&self, model: ModelHandle, listener: ContentListener)
    -> Subscription;

    fn save_view_state(&self, model: ModelHandle) -> Option<ViewState>;

    fn restore_view_state(&self, model: ModelHandle, state: ViewState);

    /// Replace all markers of the model.
    fn set_markers(&self, model: ModelHandle, markers: &[Diagnostic]);

    /// Make `model` the focused model, or clear focus with `None`.
    fn set_active_model(&self, model: Option<ModelHandle>);
}
