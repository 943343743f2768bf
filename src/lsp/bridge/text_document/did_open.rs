//! didOpen notification handling for language connections.

use super::super::pool::{ConnectionManager, LanguageConnection};
use super::super::protocol::did_open_params;
use crate::document::Document;
use crate::error::BridgeResult;

impl LanguageConnection {
    /// Send `didOpen` for `document` unless the current session already has it.
    ///
    /// Returns whether a notification was queued. While the connection is
    /// not Open nothing is sent; the handshake replay covers the document.
    pub(crate) fn did_open(&self, document: &Document) -> bool {
        self.with_open_session(|session| {
            if session.synced_version(document.uri()).is_some() {
                return false;
            }
            let params = did_open_params(
                document.uri(),
                document.language_id(),
                document.version(),
                document.text(),
            );
            if !session
                .send_notification("textDocument/didOpen", params)
                .is_queued()
            {
                return false;
            }
            session.record_synced(document.uri(), document.version());
            self.documents()
                .mark_synced(document.uri(), document.version());
            true
        })
        .unwrap_or(false)
    }
}

impl ConnectionManager {
    /// Make sure the server of the document's language knows about it.
    ///
    /// Creates the language connection on first use.
    pub fn did_open(&self, document: &Document) -> BridgeResult<bool> {
        let connection = self.get_or_create(document.language_id())?;
        Ok(connection.did_open(document))
    }
}
