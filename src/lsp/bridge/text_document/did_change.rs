//! didChange notification handling for language connections.
//!
//! Uses full content sync: every notification carries the whole text.

use super::super::pool::{ConnectionManager, LanguageConnection};
use super::super::protocol::did_change_params;
use crate::document::Document;

impl LanguageConnection {
    /// Send `didChange` with the document's current version and content.
    ///
    /// Skipped when the uri was not opened in this session (the replay on
    /// the next open carries the content) or when `version` is not newer
    /// than the last version sent.
    pub(crate) fn did_change(&self, uri: &str, version: i32, text: &str) -> bool {
        self.with_open_session(|session| {
            match session.synced_version(uri) {
                Some(sent) if sent < version => {}
                _ => return false,
            }
            if !session
                .send_notification("textDocument/didChange", did_change_params(uri, version, text))
                .is_queued()
            {
                return false;
            }
            session.record_synced(uri, version);
            self.documents().mark_synced(uri, version);
            true
        })
        .unwrap_or(false)
    }
}

impl ConnectionManager {
    /// Forward the latest content of `document` to its language server.
    ///
    /// Never creates a connection.
    pub fn did_change(&self, document: &Document) -> bool {
        self.get(document.language_id())
            .is_some_and(|connection| {
                connection.did_change(document.uri(), document.version(), document.text())
            })
    }
}
