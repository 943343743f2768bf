use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::Document;
use crate::error::{BridgeError, BridgeResult, LockResultExt};
use crate::surface::{ModelHandle, ViewState};

/// Registry of open documents keyed by uri.
///
/// All mutations happen under one short, synchronous critical section, so a
/// rename is observed either entirely before or entirely after any other
/// operation.
#[derive(Default)]
pub struct DocumentRegistry {
    documents: Mutex<HashMap<String, Document>>,
    next_seq: AtomicU64,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &self,
        uri: &str,
        language_id: &str,
        text: &str,
        model: ModelHandle,
    ) -> BridgeResult<Document> {
        let mut documents = self.documents.lock().recover_poison("DocumentRegistry::open");
        if documents.contains_key(uri) {
            return Err(BridgeError::already_open(uri));
        }
        let document = Document::new(
            uri.to_string(),
            language_id.to_string(),
            text.to_string(),
            model,
            self.next_seq.fetch_add(1, Ordering::Relaxed),
        );
        documents.insert(uri.to_string(), document.clone());
        Ok(document)
    }

    /// Record new content. Returns the document and whether the version moved.
    pub fn apply_edit(&self, uri: &str, text: &str) -> BridgeResult<(Document, bool)> {
        let mut documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::apply_edit");
        let document = documents
            .get_mut(uri)
            .ok_or_else(|| BridgeError::not_found(uri))?;
        let changed = document.apply_edit(text);
        Ok((document.clone(), changed))
    }

    pub fn close(&self, uri: &str) -> BridgeResult<Document> {
        self.documents
            .lock()
            .recover_poison("DocumentRegistry::close")
            .remove(uri)
            .ok_or_else(|| BridgeError::not_found(uri))
    }

    /// Replace `old_uri` with a new document under `new_uri` in one step.
    pub fn rename(
        &self,
        old_uri: &str,
        new_uri: &str,
        model: ModelHandle,
    ) -> BridgeResult<Document> {
        let mut documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::rename");
        if documents.contains_key(new_uri) {
            return Err(BridgeError::already_open(new_uri));
        }
        let old = documents
            .remove(old_uri)
            .ok_or_else(|| BridgeError::not_found(old_uri))?;
        let renamed = old.renamed(
            new_uri.to_string(),
            model,
            self.next_seq.fetch_add(1, Ordering::Relaxed),
        );
        documents.insert(new_uri.to_string(), renamed.clone());
        Ok(renamed)
    }

    pub fn get(&self, uri: &str) -> Option<Document> {
        self.documents
            .lock()
            .recover_poison("DocumentRegistry::get")
            .get(uri)
            .cloned()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.documents
            .lock()
            .recover_poison("DocumentRegistry::contains")
            .contains_key(uri)
    }

    /// All open documents in open order.
    pub fn snapshot(&self) -> Vec<Document> {
        let documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::snapshot");
        let mut all: Vec<Document> = documents.values().cloned().collect();
        all.sort_by_key(Document::open_seq);
        all
    }

    /// Open documents of one language in open order.
    pub fn documents_for_language(&self, language_id: &str) -> Vec<Document> {
        let documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::documents_for_language");
        let mut matching: Vec<Document> = documents
            .values()
            .filter(|document| document.language_id() == language_id)
            .cloned()
            .collect();
        matching.sort_by_key(Document::open_seq);
        matching
    }

    pub fn has_language(&self, language_id: &str) -> bool {
        self.documents
            .lock()
            .recover_poison("DocumentRegistry::has_language")
            .values()
            .any(|document| document.language_id() == language_id)
    }

    /// Record that `version` of `uri` reached the server.
    pub fn mark_synced(&self, uri: &str, version: i32) {
        let mut documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::mark_synced");
        if let Some(document) = documents.get_mut(uri) {
            document.mark_sent(version);
        }
    }

    pub fn mark_clean(&self, uri: &str) -> BridgeResult<()> {
        let mut documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::mark_clean");
        documents
            .get_mut(uri)
            .ok_or_else(|| BridgeError::not_found(uri))?
            .mark_clean();
        Ok(())
    }

    pub fn set_view_state(&self, uri: &str, view_state: Option<ViewState>) -> BridgeResult<()> {
        let mut documents = self
            .documents
            .lock()
            .recover_poison("DocumentRegistry::set_view_state");
        documents
            .get_mut(uri)
            .ok_or_else(|| BridgeError::not_found(uri))?
            .set_view_state(view_state);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .recover_poison("DocumentRegistry::len")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
