//! Diagnostic model shown as markers on the surface.

use lsp_types::{DiagnosticSeverity, NumberOrString};
use serde::{Deserialize, Serialize};

/// Zero-based range; columns are UTF-16 code units as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub range: MarkerRange,
    pub message: String,
    pub severity: Severity,
    pub source: Option<String>,
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(range: MarkerRange, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            range,
            message: message.into(),
            severity,
            source: None,
            code: None,
        }
    }
}

impl From<&lsp_types::Diagnostic> for Diagnostic {
    fn from(diagnostic: &lsp_types::Diagnostic) -> Self {
        // Servers may omit severity; the protocol leaves interpretation to the client
        let severity = match diagnostic.severity {
            Some(DiagnosticSeverity::WARNING) => Severity::Warning,
            Some(DiagnosticSeverity::INFORMATION) => Severity::Information,
            Some(DiagnosticSeverity::HINT) => Severity::Hint,
            _ => Severity::Error,
        };
        let code = diagnostic.code.as_ref().map(|code| match code {
            NumberOrString::Number(number) => number.to_string(),
            NumberOrString::String(text) => text.clone(),
        });

        Self {
            range: MarkerRange {
                start_line: diagnostic.range.start.line,
                start_col: diagnostic.range.start.character,
                end_line: diagnostic.range.end.line,
                end_col: diagnostic.range.end.character,
            },
            message: diagnostic.message.clone(),
            severity,
            source: diagnostic.source.clone(),
            code,
        }
    }
}
