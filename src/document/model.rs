use crate::surface::{ModelHandle, ViewState};

/// An open document as the bridge sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    uri: String,
    language_id: String,
    version: i32,
    text: String,
    model: ModelHandle,
    dirty: bool,
    last_sent_version: Option<i32>,
    view_state: Option<ViewState>,
    open_seq: u64,
}

impl Document {
    pub(crate) fn new(
        uri: String,
        language_id: String,
        text: String,
        model: ModelHandle,
        open_seq: u64,
    ) -> Self {
        Self {
            uri,
            language_id,
            version: 1,
            text,
            model,
            dirty: false,
            last_sent_version: None,
            view_state: None,
            open_seq,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn model(&self) -> ModelHandle {
        self.model
    }

    /// True when local edits have not been saved by the host.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Last version delivered to the server in the current session.
    pub fn last_sent_version(&self) -> Option<i32> {
        self.last_sent_version
    }

    pub fn view_state(&self) -> Option<ViewState> {
        self.view_state
    }

    pub(crate) fn open_seq(&self) -> u64 {
        self.open_seq
    }

    /// True when the latest version has not reached the server yet.
    pub fn has_unsent_changes(&self) -> bool {
        self.last_sent_version
            .is_none_or(|sent| sent < self.version)
    }

    /// Replace content and bump the version. Returns false for identical content.
    pub(crate) fn apply_edit(&mut self, text: &str) -> bool {
        if self.text == text {
            return false;
        }
        self.text = text.to_string();
        self.version += 1;
        self.dirty = true;
        true
    }

    pub(crate) fn mark_sent(&mut self, version: i32) {
        // Never move the marker backwards
        if self.last_sent_version.is_none_or(|sent| sent < version) {
            self.last_sent_version = Some(version);
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn set_view_state(&mut self, view_state: Option<ViewState>) {
        self.view_state = view_state;
    }

    /// Build the document that replaces this one under a new uri.
    pub(crate) fn renamed(&self, new_uri: String, model: ModelHandle, open_seq: u64) -> Self {
        Self {
            uri: new_uri,
            language_id: self.language_id.clone(),
            version: 1,
            text: self.text.clone(),
            model,
            dirty: self.dirty,
            last_sent_version: None,
            view_state: self.view_state,
            open_seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new(
            "file:///a.js".into(),
            "javascript".into(),
            "let a".into(),
            ModelHandle::new(1),
            0,
        )
    }

    #[test]
    fn new_document_starts_at_version_one_and_clean() {
        let document = doc();
        assert_eq!(document.version(), 1);
        assert!(!document.is_dirty());
        assert!(document.has_unsent_changes());
    }

    #[test]
    fn identical_edit_is_ignored() {
        let mut document = doc();
        assert!(!document.apply_edit("let a"));
        assert_eq!(document.version(), 1);
        assert!(document.apply_edit("let ab"));
        assert_eq!(document.version(), 2);
        assert!(document.is_dirty());
    }

    #[test]
    fn sent_marker_never_moves_backwards() {
        let mut document = doc();
        document.mark_sent(3);
        document.mark_sent(2);
        assert_eq!(document.last_sent_version(), Some(3));
    }

    #[test]
    fn renamed_document_restarts_versioning_and_keeps_dirty_flag() {
        let mut document = doc();
        document.apply_edit("let abc");
        document.mark_sent(2);

        let renamed = document.renamed("file:///b.js".into(), ModelHandle::new(2), 5);

        assert_eq!(renamed.uri(), "file:///b.js");
        assert_eq!(renamed.version(), 1);
        assert_eq!(renamed.text(), "let abc");
        assert!(renamed.is_dirty());
        assert_eq!(renamed.last_sent_version(), None);
    }
}
