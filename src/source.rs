//! Source documents and offset bookkeeping.
//!
//! Every document the engine looks at (the grammar and the input text) is
//! addressed with byte offsets internally. Users see 1-based line and column
//! numbers, where the column counts characters rather than bytes.

use serde::Serialize;

/// A half-open byte range into one of the two documents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// An empty span marking an insertion point.
    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<pest::Span<'_>> for Span {
    fn from(span: pest::Span<'_>) -> Self {
        Self {
            start: span.start(),
            end: span.end(),
        }
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        miette::SourceSpan::new(span.start.into(), span.len())
    }
}

/// A 1-based line/column location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A borrowed document together with its line table.
#[derive(Debug, Clone)]
pub struct SourceText<'src> {
    content: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> SourceText<'src> {
    pub fn new(content: &'src str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(content.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            content,
            line_starts,
        }
    }

    pub fn content(&self) -> &'src str {
        self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Converts a byte offset to a line/column position.
    ///
    /// Offsets past the end clamp to the end of the document, offsets inside a
    /// multi-byte character resolve to that character.
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.content.len());
        while !self.content.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self.content[line_start..offset].chars().count() + 1;
        Position::new(line, column)
    }

    /// The position just past the last character.
    pub fn end_position(&self) -> Position {
        self.position(self.content.len())
    }

    /// Byte offset of the character after the one starting at `offset`.
    pub fn next_char_boundary(&self, offset: usize) -> usize {
        self.content[offset..]
            .chars()
            .next()
            .map_or(self.content.len(), |c| offset + c.len_utf8())
    }
}
