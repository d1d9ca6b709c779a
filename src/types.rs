//! Position and range conversions between the parser and the LSP.
//!
//! The parser's locations are zero-based line/column pairs, as are LSP
//! positions, so conversion is structural. The wrappers exist to keep `From`
//! impls in one place and to carry the word-extraction helper every point
//! query starts from.

use tower_lsp::lsp_types::{Position as LspPosition, Range as LspRange};

use speclsp::parser::ast::{Location, Span};

/// A position in a document (line, column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position(pub LspPosition);

impl From<Location> for Position {
    fn from(loc: Location) -> Self {
        Position(LspPosition::new(loc.line, loc.column))
    }
}

impl From<Position> for Location {
    fn from(pos: Position) -> Self {
        Location::new(pos.0.line, pos.0.character)
    }
}

impl From<LspPosition> for Position {
    fn from(pos: LspPosition) -> Self {
        Position(pos)
    }
}

impl From<Position> for LspPosition {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// A range in a document (start and end positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range(pub LspRange);

impl From<Span> for Range {
    fn from(span: Span) -> Self {
        Range(LspRange::new(
            Position::from(span.start).into(),
            Position::from(span.end).into(),
        ))
    }
}

impl From<Range> for LspRange {
    fn from(range: Range) -> Self {
        range.0
    }
}

/// The identifier-shaped word under `position`, with its range.
pub fn word_at(content: &str, position: LspPosition) -> Option<(String, LspRange)> {
    let line = content.lines().nth(position.line as usize)?;
    let chars: Vec<char> = line.chars().collect();
    let col = (position.character as usize).min(chars.len());

    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut start = col;
    while start > 0 && is_word(chars[start - 1]) {
        start -= 1;
    }
    let mut end = col;
    while end < chars.len() && is_word(chars[end]) {
        end += 1;
    }
    if start == end {
        return None;
    }
    let word: String = chars[start..end].iter().collect();
    let range = LspRange::new(
        LspPosition::new(position.line, start as u32),
        LspPosition::new(position.line, end as u32),
    );
    Some((word, range))
}

/// The text of the cursor's line up to the cursor, for call-site scanning.
pub fn line_to_cursor(content: &str, position: LspPosition) -> Option<String> {
    let line = content.lines().nth(position.line as usize)?;
    let chars: Vec<char> = line.chars().collect();
    let col = (position.character as usize).min(chars.len());
    Some(chars[..col].iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_extraction() {
        let content = "x = motor_par(0, \"step_size\")\n";
        let (word, range) = word_at(content, LspPosition::new(0, 6)).unwrap();
        assert_eq!(word, "motor_par");
        assert_eq!(range.start.character, 4);
        assert_eq!(range.end.character, 13);
    }

    #[test]
    fn no_word_in_whitespace() {
        assert!(word_at("a  b\n", LspPosition::new(0, 2)).is_none());
    }

    #[test]
    fn cursor_at_word_end_still_matches() {
        let (word, _) = word_at("wa\n", LspPosition::new(0, 2)).unwrap();
        assert_eq!(word, "wa");
    }
}
