// Diagnostic records and the source map used to position them.
// Positions are 1-based; columns count characters, not bytes.
use std::fmt;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_SOURCE_NAME: &str = "<string>";
const MISSING_LINE: &str = "<N/A>";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub source_name: String,
    pub line: u32,
    pub column: u32,
    pub source_line_text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}:{}:{}: {}",
            self.source_name, self.line, self.column, self.message
        )?;
        writeln!(f, "    {}", self.source_line_text)?;
        let pad = (self.column as usize).saturating_sub(1);
        write!(f, "    {}^", " ".repeat(pad))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source text plus a line index, shared by the lexer, parser and validator.
#[derive(Debug)]
pub struct SourceMap<'a> {
    name: &'a str,
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self {
            name,
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of the character starting at `offset` (a byte offset).
    pub fn pos(&self, offset: usize) -> Pos {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let start = self.line_starts[line_idx];
        let column = self.text[start..offset].chars().count() + 1;
        Pos::new(line_idx as u32 + 1, column as u32)
    }

    /// Position just past the last character of the source.
    pub fn end_pos(&self) -> Pos {
        let trimmed = self.text.trim_end_matches(['\n', '\r']);
        self.pos(trimmed.len())
    }

    /// Physical line text without its terminator; `<N/A>` when out of range.
    pub fn line_text(&self, line: u32) -> &'a str {
        let Some(idx) = (line as usize).checked_sub(1) else {
            return MISSING_LINE;
        };
        let Some(&start) = self.line_starts.get(idx) else {
            return MISSING_LINE;
        };
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches('\r')
    }

    pub fn diagnostic(&self, pos: Pos, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            message: message.into(),
            source_name: self.name.to_string(),
            line: pos.line,
            column: pos.column,
            source_line_text: self.line_text(pos.line).to_string(),
        }
    }

    pub fn error(&self, kind: ErrorKind, pos: Pos, message: impl Into<String>) -> Error {
        Error::from_diagnostic(kind, self.diagnostic(pos, message))
    }
}

#[cfg(test)]
mod tests {
    use super::{Pos, SourceMap};
    use crate::core::error::ErrorKind;

    #[test]
    fn positions_are_one_based() {
        let map = SourceMap::new("<string>", "ab\ncd");
        assert_eq!(map.pos(0), Pos::new(1, 1));
        assert_eq!(map.pos(1), Pos::new(1, 2));
        assert_eq!(map.pos(3), Pos::new(2, 1));
        assert_eq!(map.pos(4), Pos::new(2, 2));
    }

    #[test]
    fn columns_count_characters() {
        let map = SourceMap::new("<string>", "'é' x");
        assert_eq!(map.pos("'é' ".len()), Pos::new(1, 5));
    }

    #[test]
    fn line_text_strips_terminators() {
        let map = SourceMap::new("doc", "first\r\nsecond\n");
        assert_eq!(map.line_text(1), "first");
        assert_eq!(map.line_text(2), "second");
        assert_eq!(map.line_text(3), "");
        assert_eq!(map.line_text(9), "<N/A>");
        assert_eq!(map.line_text(0), "<N/A>");
    }

    #[test]
    fn end_pos_ignores_trailing_newlines() {
        let map = SourceMap::new("doc", "{foo:42\n");
        assert_eq!(map.end_pos(), Pos::new(1, 8));
    }

    #[test]
    fn error_carries_diagnostic_fields() {
        let map = SourceMap::new("<string>", "1 + 2");
        let err = map.error(ErrorKind::IllegalCombine, Pos::new(1, 1), "boom");
        let diagnostic = err.diagnostic().expect("diagnostic");
        assert_eq!(diagnostic.source_line_text, "1 + 2");
        assert_eq!(diagnostic.source_name, "<string>");
        assert_eq!(err.message(), Some("boom"));
    }
}
