//! Formatting request handling for language connections.

use lsp_types::TextEdit;

use super::super::pool::ConnectionManager;
use super::super::protocol::{decode_text_edits, formatting_params};
use crate::config::FormattingSettings;
use crate::document::Document;
use crate::error::BridgeResult;

impl ConnectionManager {
    /// Request whole-document formatting edits for `document`.
    ///
    /// The request is tagged with the document uri, so closing or renaming
    /// the document while it is in flight cancels it.
    pub async fn formatting(
        &self,
        document: &Document,
        formatting: FormattingSettings,
    ) -> BridgeResult<Vec<TextEdit>> {
        let result = self
            .send_request(
                document.language_id(),
                "textDocument/formatting",
                formatting_params(document.uri(), formatting),
                Some(document.uri()),
            )
            .await?;
        decode_text_edits(result)
    }
}
