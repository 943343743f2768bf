//! Headless [`EditableSurface`] backed by in-memory buffers.
//!
//! Used by the probe binary and by tests. Listeners are collected under the
//! lock and invoked after it is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::{ContentListener, EditableSurface, ModelHandle, Subscription, ViewState};
use crate::error::LockResultExt;
use crate::lsp::Diagnostic;

struct ModelEntry {
    uri: String,
    language_id: String,
    content: String,
    view_state: ViewState,
    markers: Vec<Diagnostic>,
    listeners: Vec<(u64, ContentListener)>,
}

#[derive(Default)]
struct SurfaceState {
    models: HashMap<ModelHandle, ModelEntry>,
    active: Option<ModelHandle>,
}

/// In-memory editor surface.
#[derive(Default)]
pub struct MemorySurface {
    state: Arc<Mutex<SurfaceState>>,
    next_model: AtomicU64,
    next_listener: AtomicU64,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user edit: replace content and notify listeners.
    pub fn type_text(&self, model: ModelHandle, content: &str) {
        self.set_content(model, content);
    }

    /// Move the cursor of a model, as a user click would.
    pub fn move_cursor(&self, model: ModelHandle, line: u32, column: u32) {
        let mut state = self.state.lock().recover_poison("MemorySurface::move_cursor");
        if let Some(entry) = state.models.get_mut(&model) {
            entry.view_state.cursor_line = line;
            entry.view_state.cursor_column = column;
        }
    }

    pub fn view_state(&self, model: ModelHandle) -> Option<ViewState> {
        let state = self.state.lock().recover_poison("MemorySurface::view_state");
        state.models.get(&model).map(|entry| entry.view_state)
    }

    pub fn markers(&self, model: ModelHandle) -> Vec<Diagnostic> {
        let state = self.state.lock().recover_poison("MemorySurface::markers");
        state
            .models
            .get(&model)
            .map(|entry| entry.markers.clone())
            .unwrap_or_default()
    }

    pub fn active_model(&self) -> Option<ModelHandle> {
        self.state
            .lock()
            .recover_poison("MemorySurface::active_model")
            .active
    }

    /// Find the live model created for `uri`.
    pub fn model_for_uri(&self, uri: &str) -> Option<ModelHandle> {
        let state = self.state.lock().recover_poison("MemorySurface::model_for_uri");
        state
            .models
            .iter()
            .find(|(_, entry)| entry.uri == uri)
            .map(|(handle, _)| *handle)
    }

    pub fn language_of(&self, model: ModelHandle) -> Option<String> {
        let state = self.state.lock().recover_poison("MemorySurface::language_of");
        state
            .models
            .get(&model)
            .map(|entry| entry.language_id.clone())
    }

    pub fn model_count(&self) -> usize {
        self.state
            .lock()
            .recover_poison("MemorySurface::model_count")
            .models
            .len()
    }

    pub fn listener_count(&self, model: ModelHandle) -> usize {
        let state = self.state.lock().recover_poison("MemorySurface::listener_count");
        state
            .models
            .get(&model)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }
}

impl EditableSurface for MemorySurface {
    fn create_model(&self, uri: &str, language_id: &str, content: &str) -> ModelHandle {
        let handle = ModelHandle::new(self.next_model.fetch_add(1, Ordering::Relaxed) + 1);
        let mut state = self.state.lock().recover_poison("MemorySurface::create_model");
        state.models.insert(
            handle,
            ModelEntry {
                uri: uri.to_string(),
                language_id: language_id.to_string(),
                content: content.to_string(),
                view_state: ViewState::default(),
                markers: Vec::new(),
                listeners: Vec::new(),
            },
        );
        handle
    }

    fn dispose_model(&self, model: ModelHandle) {
        let removed = {
            let mut state = self.state.lock().recover_poison("MemorySurface::dispose_model");
            if state.active == Some(model) {
                state.active = None;
            }
            state.models.remove(&model)
        };
        // Listener closures may own handles into the bridge; drop them unlocked
        drop(removed);
    }

    fn content(&self, model: ModelHandle) -> Option<String> {
        let state = self.state.lock().recover_poison("MemorySurface::content");
        state.models.get(&model).map(|entry| entry.content.clone())
    }

    fn set_content(&self, model: ModelHandle, content: &str) {
        let listeners: Vec<ContentListener> = {
            let mut state = self.state.lock().recover_poison("MemorySurface::set_content");
            let Some(entry) = state.models.get_mut(&model) else {
                return;
            };
            if entry.content == content {
                return;
            }
            entry.content = content.to_string();
            entry
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        for listener in listeners {
            listener(content);
        }
    }

    fn subscribe_content_change(
        &self,
        model: ModelHandle,
        listener: ContentListener,
    ) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self
                .state
                .lock()
                .recover_poison("MemorySurface::subscribe_content_change");
            match state.models.get_mut(&model) {
                Some(entry) => entry.listeners.push((id, listener)),
                None => return Subscription::empty(),
            }
        }

        let weak: Weak<Mutex<SurfaceState>> = Arc::downgrade(&self.state);
        Subscription::new(move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let removed = {
                let mut state = state.lock().recover_poison("MemorySurface::unsubscribe");
                state.models.get_mut(&model).and_then(|entry| {
                    entry
                        .listeners
                        .iter()
                        .position(|(listener_id, _)| *listener_id == id)
                        .map(|index| entry.listeners.remove(index))
                })
            };
            drop(removed);
        })
    }

    fn save_view_state(&self, model: ModelHandle) -> Option<ViewState> {
        self.view_state(model)
    }

    fn restore_view_state(&self, model: ModelHandle, view_state: ViewState) {
        let mut state = self
            .state
            .lock()
            .recover_poison("MemorySurface::restore_view_state");
        if let Some(entry) = state.models.get_mut(&model) {
            entry.view_state = view_state;
        }
    }

    fn set_markers(&self, model: ModelHandle, markers: &[Diagnostic]) {
        let mut state = self.state.lock().recover_poison("MemorySurface::set_markers");
        if let Some(entry) = state.models.get_mut(&model) {
            entry.markers = markers.to_vec();
        }
    }

    fn set_active_model(&self, model: Option<ModelHandle>) {
        let mut state = self
            .state
            .lock()
            .recover_poison("MemorySurface::set_active_model");
        let active = model.filter(|handle| state.models.contains_key(handle));
        state.active = active;
    }
}
