//! UTF-16 position mapping and text edit application.

use lsp_types::{Position, TextEdit};

/// Maps LSP positions (UTF-16 columns) to byte offsets in a text.
pub struct PositionMapper<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> PositionMapper<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            line_starts: compute_line_starts(text),
        }
    }

    /// Byte offset of `position`.
    ///
    /// Positions past the end of a line clamp to the line end; positions past
    /// the last line clamp to the end of the text, which is how servers
    /// address "replace the whole document".
    pub fn position_to_byte(&self, position: Position) -> usize {
        let line = position.line as usize;
        let Some(&line_start) = self.line_starts.get(line) else {
            return self.text.len();
        };

        let line_end = if line + 1 < self.line_starts.len() {
            self.line_starts[line + 1] - 1
        } else {
            self.text.len()
        };
        let line_text = &self.text[line_start..line_end];

        match convert_utf16_to_byte_in_line(line_text, position.character as usize) {
            Some(offset) => line_start + offset,
            None => line_end,
        }
    }
}

/// Compute line start offsets for efficient position mapping
pub fn compute_line_starts(text: &str) -> Vec<usize> {
    let mut line_starts = vec![0];
    let mut offset = 0;

    for ch in text.chars() {
        offset += ch.len_utf8();
        if ch == '\n' {
            line_starts.push(offset);
        }
    }

    line_starts
}

/// Convert UTF-16 position to byte position within a line
/// Returns None if the UTF-16 position is beyond the end of the line
fn convert_utf16_to_byte_in_line(line_text: &str, utf16_pos: usize) -> Option<usize> {
    let mut byte_offset = 0;
    let mut utf16_offset = 0;

    for ch in line_text.chars() {
        if utf16_offset >= utf16_pos {
            return Some(byte_offset);
        }
        utf16_offset += ch.len_utf16();
        byte_offset += ch.len_utf8();
    }

    (utf16_offset == utf16_pos).then_some(byte_offset)
}

/// Apply `edits` computed against `text` and return the new content.
///
/// Edits are non-overlapping per protocol; they are applied back to front so
/// earlier offsets stay valid. Edits starting at the same position keep their
/// array order.
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> String {
    let mapper = PositionMapper::new(text);
    let mut resolved: Vec<(usize, usize, usize, &str)> = edits
        .iter()
        .enumerate()
        .map(|(index, edit)| {
            let start = mapper.position_to_byte(edit.range.start);
            let end = mapper.position_to_byte(edit.range.end).max(start);
            (start, end, index, edit.new_text.as_str())
        })
        .collect();
    resolved.sort_by(|a, b| b.0.cmp(&a.0).then(b.2.cmp(&a.2)));

    let mut result = text.to_string();
    for (start, end, _, new_text) in resolved {
        result.replace_range(start..end, new_text);
    }
    result
}
