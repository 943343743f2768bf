//! didClose notification handling for language connections.

use super::super::pool::{ConnectionManager, LanguageConnection};
use super::super::protocol::did_close_params;

impl LanguageConnection {
    /// Forget `uri` for this session and send `didClose` if it had been opened.
    ///
    /// The connection stays up for other documents.
    pub(crate) fn did_close(&self, uri: &str) -> bool {
        self.with_open_session(|session| {
            session.forget(uri)
                && session
                    .send_notification("textDocument/didClose", did_close_params(uri))
                    .is_queued()
        })
        .unwrap_or(false)
    }
}

impl ConnectionManager {
    pub fn did_close(&self, language_id: &str, uri: &str) -> bool {
        self.get(language_id)
            .is_some_and(|connection| connection.did_close(uri))
    }
}
