//! Incrementally highlighted text.

use std::ops::Range;

use log::trace;

use super::{highlight_line, without_cr, HighlightSpan, LineState};

#[derive(Debug, Clone)]
struct Line {
    text: String,
    /// State the line was last scanned from.
    entry: LineState,
    exit: LineState,
    /// Line-relative spans.
    spans: Vec<HighlightSpan>,
}

impl Line {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            entry: LineState::default(),
            exit: LineState::default(),
            spans: Vec::new(),
        }
    }

    fn scan(&mut self, entry: LineState) {
        self.entry = entry;
        self.spans.clear();
        self.exit = highlight_line(without_cr(&self.text), entry, &mut self.spans);
    }
}

/// A grammar document that keeps per-line highlighting up to date across
/// edits, re-scanning only the lines whose entry state changed.
#[derive(Debug, Clone)]
pub struct HighlightedDocument {
    lines: Vec<Line>,
}

impl HighlightedDocument {
    pub fn new(text: &str) -> Self {
        let mut document = Self {
            lines: text.split('\n').map(Line::new).collect(),
        };
        document.rescan(0, document.lines.len());
        document
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|line| line.text.as_str())
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Spans of one line, relative to the start of that line.
    pub fn line_spans(&self, index: usize) -> Option<&[HighlightSpan]> {
        self.lines.get(index).map(|line| line.spans.as_slice())
    }

    /// Spans of the whole document with offsets into [`text`](Self::text).
    pub fn spans(&self) -> Vec<HighlightSpan> {
        let mut offset = 0;
        let mut spans = Vec::new();
        for line in &self.lines {
            spans.extend(line.spans.iter().map(|span| HighlightSpan {
                start: span.start + offset,
                end: span.end + offset,
                class: span.class,
            }));
            offset += line.text.len() + 1;
        }
        spans
    }

    /// Replaces one line. `text` may contain newlines, in which case the line
    /// becomes several. Returns how many lines were re-scanned.
    pub fn replace_line(&mut self, index: usize, text: &str) -> usize {
        self.splice(index..index + 1, text)
    }

    /// Replaces the lines in `range` with the lines of `text` (an empty
    /// `text` still contributes one empty line). Returns how many lines were
    /// re-scanned.
    ///
    /// The range is clamped to the document.
    pub fn splice(&mut self, range: Range<usize>, text: &str) -> usize {
        let start = range.start.min(self.lines.len());
        let end = range.end.clamp(start, self.lines.len());
        let inserted: Vec<Line> = text.split('\n').map(Line::new).collect();
        let count = inserted.len();
        self.lines.splice(start..end, inserted);
        let rescanned = self.rescan(start, start + count);
        trace!("edit of lines {start}..{end} re-scanned {rescanned} line(s)");
        rescanned
    }

    /// Scans from `first`. Every line before `min_end` is scanned; after that
    /// scanning stops at the first line whose entry state is unchanged.
    fn rescan(&mut self, first: usize, min_end: usize) -> usize {
        let mut state = match first.checked_sub(1) {
            Some(previous) => self.lines[previous].exit,
            None => LineState::default(),
        };
        let mut rescanned = 0;
        for (index, line) in self.lines.iter_mut().enumerate().skip(first) {
            if index >= min_end && line.entry == state {
                break;
            }
            line.scan(state);
            state = line.exit;
            rescanned += 1;
        }
        rescanned
    }
}
