//! Params builders and result decoders for the supported method set.

use lsp_types::TextEdit;
use serde::Deserialize;
use serde_json::{Value, json};

use super::request_id::RequestId;
use crate::config::FormattingSettings;
use crate::error::{BridgeError, BridgeResult};

pub(crate) fn did_open_params(uri: &str, language_id: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

/// Full-content sync: one change carrying the whole text.
pub(crate) fn did_change_params(uri: &str, version: i32, text: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [
            {
                "text": text
            }
        ]
    })
}

pub(crate) fn did_close_params(uri: &str) -> Value {
    json!({
        "textDocument": {
            "uri": uri
        }
    })
}

pub(crate) fn formatting_params(uri: &str, formatting: FormattingSettings) -> Value {
    json!({
        "textDocument": {
            "uri": uri
        },
        "options": {
            "tabSize": formatting.tab_size,
            "insertSpaces": formatting.insert_spaces
        }
    })
}

/// Params shared by `workspace/willRenameFiles` and `workspace/didRenameFiles`.
pub(crate) fn rename_files_params(old_uri: &str, new_uri: &str) -> Value {
    json!({
        "files": [
            {
                "oldUri": old_uri,
                "newUri": new_uri
            }
        ]
    })
}

pub(crate) fn cancel_params(id: RequestId) -> Value {
    json!({ "id": id.as_i64() })
}

/// Decode a `textDocument/formatting` result; `null` means no edits.
pub(crate) fn decode_text_edits(result: Value) -> BridgeResult<Vec<TextEdit>> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(result)
        .map_err(|err| BridgeError::protocol(format!("invalid formatting result: {}", err)))
}

/// `textDocument/publishDiagnostics` params with the uri kept verbatim.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnostics {
    pub(crate) uri: String,
    #[serde(default)]
    pub(crate) version: Option<i32>,
    pub(crate) diagnostics: Vec<lsp_types::Diagnostic>,
}

pub(crate) fn decode_publish_diagnostics(params: Value) -> BridgeResult<PublishDiagnostics> {
    serde_json::from_value(params)
        .map_err(|err| BridgeError::protocol(format!("invalid publishDiagnostics: {}", err)))
}
