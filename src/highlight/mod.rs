//! Grammar Syntax Highlighting
//!
//! A line-oriented scanner over grammar text. Each line is scanned from the
//! state the previous line ended in, which is all an editor needs to
//! re-highlight incrementally (see [`HighlightedDocument`]).
//!
//! The scanner is independent of the grammar compiler: it never fails, and
//! text it does not recognize is simply left uncolored.

mod document;
mod patterns;

use serde::Serialize;

pub use document::HighlightedDocument;

use patterns::{classify, Token, TABLE};

/// What a highlighted span is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightClass {
    Keyword,
    ParserRule,
    LexerRule,
    Literal,
    CharSet,
    Comment,
    Action,
    /// Lexer commands after `->`.
    Command,
    Operator,
    Delimiter,
}

impl HighlightClass {
    pub fn name(self) -> &'static str {
        match self {
            HighlightClass::Keyword => "keyword",
            HighlightClass::ParserRule => "parser_rule",
            HighlightClass::LexerRule => "lexer_rule",
            HighlightClass::Literal => "literal",
            HighlightClass::CharSet => "char_set",
            HighlightClass::Comment => "comment",
            HighlightClass::Action => "action",
            HighlightClass::Command => "command",
            HighlightClass::Operator => "operator",
            HighlightClass::Delimiter => "delimiter",
        }
    }
}

/// A classified byte range of the highlighted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
    pub class: HighlightClass,
}

/// Scanner state carried from the end of one line to the start of the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LineState {
    /// Inside a `/* ... */` comment.
    pub in_comment: bool,
    /// Brace nesting inside an embedded action; zero outside actions.
    pub action_depth: u32,
}

// ============================================================================
// WHOLE-TEXT HIGHLIGHTING
// ============================================================================

/// Highlights `text`, producing spans lazily line by line in text order.
///
/// Calling it again on the same text restarts from the beginning.
pub fn highlight(text: &str) -> Highlights<'_> {
    Highlights {
        text,
        offset: 0,
        state: LineState::default(),
        pending: Vec::new().into_iter(),
    }
}

/// Iterator returned by [`highlight`].
#[derive(Debug, Clone)]
pub struct Highlights<'a> {
    text: &'a str,
    /// Start of the next unscanned line, or past the end once done.
    offset: usize,
    state: LineState,
    pending: std::vec::IntoIter<HighlightSpan>,
}

impl Iterator for Highlights<'_> {
    type Item = HighlightSpan;

    fn next(&mut self) -> Option<HighlightSpan> {
        loop {
            if let Some(span) = self.pending.next() {
                return Some(span);
            }
            if self.offset >= self.text.len() {
                return None;
            }
            let rest = &self.text[self.offset..];
            let line_len = rest.find('\n').unwrap_or(rest.len());
            let mut spans = Vec::new();
            self.state = highlight_line(without_cr(&rest[..line_len]), self.state, &mut spans);
            for span in &mut spans {
                span.start += self.offset;
                span.end += self.offset;
            }
            self.pending = spans.into_iter();
            self.offset += line_len + 1;
        }
    }
}

/// A line as the scanner sees it: CRLF line endings leave a `\r` behind.
fn without_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

// ============================================================================
// LINE SCANNER
// ============================================================================

/// Highlights a single line (without its newline) starting in `state`,
/// appending line-relative spans to `out`. Returns the state the line ends in.
pub fn highlight_line(line: &str, state: LineState, out: &mut Vec<HighlightSpan>) -> LineState {
    let mut state = state;
    let mut pos = 0;
    // Where a comment or action opened on this line began.
    let mut opened_at: Option<usize> = None;

    loop {
        if state.in_comment {
            let start = opened_at.take().unwrap_or(pos);
            match line[pos..].find("*/") {
                Some(close) => {
                    let end = pos + close + 2;
                    out.push(span(start, end, HighlightClass::Comment));
                    state.in_comment = false;
                    pos = end;
                }
                None => {
                    push_nonempty(out, start, line.len(), HighlightClass::Comment);
                    return state;
                }
            }
        }

        if state.action_depth > 0 {
            let start = opened_at.take().unwrap_or(pos);
            match scan_action(line, pos, &mut state.action_depth) {
                Some(end) => {
                    out.push(span(start, end, HighlightClass::Action));
                    pos = end;
                }
                None => {
                    push_nonempty(out, start, line.len(), HighlightClass::Action);
                    return state;
                }
            }
        }

        if pos >= line.len() {
            return state;
        }
        let Some(captures) = TABLE.captures_at(line, pos) else {
            return state;
        };
        let Some(whole) = captures.get(0) else {
            return state;
        };
        match classify(&captures) {
            Some(Token::Span(class)) => out.push(span(whole.start(), whole.end(), class)),
            Some(Token::OpenComment) => {
                state.in_comment = true;
                opened_at = Some(whole.start());
            }
            Some(Token::OpenAction) => {
                state.action_depth = 1;
                opened_at = Some(whole.start());
            }
            None => {}
        }
        pos = whole.end();
    }
}

/// Scans action text from `pos`, tracking brace depth. Returns the end of
/// the closing brace, or `None` if the action continues past this line.
fn scan_action(line: &str, pos: usize, depth: &mut u32) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in line[pos..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => *depth += 1,
            '}' => {
                *depth -= 1;
                if *depth == 0 {
                    return Some(pos + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn span(start: usize, end: usize, class: HighlightClass) -> HighlightSpan {
    HighlightSpan { start, end, class }
}

fn push_nonempty(out: &mut Vec<HighlightSpan>, start: usize, end: usize, class: HighlightClass) {
    if start < end {
        out.push(span(start, end, class));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(text: &str) -> Vec<(&str, HighlightClass)> {
        highlight(text).map(|s| (&text[s.start..s.end], s.class)).collect()
    }

    #[test]
    fn empty_text_has_no_spans() {
        assert_eq!(highlight("").count(), 0);
    }

    #[test]
    fn line_comment() {
        assert_eq!(highlight("// hi").collect::<Vec<_>>(), vec![span(0, 5, HighlightClass::Comment)]);
    }

    #[test]
    fn rule_definitions() {
        use HighlightClass::*;
        assert_eq!(
            classes("grammar G;\nexpr : INT '+' [0-9] ;"),
            vec![
                ("grammar", Keyword),
                ("G", LexerRule),
                (";", Delimiter),
                ("expr", ParserRule),
                (":", Delimiter),
                ("INT", LexerRule),
                ("'+'", Literal),
                ("[0-9]", CharSet),
                (";", Delimiter),
            ]
        );
    }

    #[test]
    fn lexer_commands() {
        use HighlightClass::*;
        assert_eq!(
            classes("WS : ' ' -> skip ;"),
            vec![("WS", LexerRule), (":", Delimiter), ("' '", Literal), ("->", Operator), ("skip", Command), (";", Delimiter)]
        );
    }

    #[test]
    fn block_comments_span_lines() {
        let text = "a /* one\ntwo */ b";
        assert_eq!(
            classes(text),
            vec![
                ("a", HighlightClass::ParserRule),
                ("/* one", HighlightClass::Comment),
                ("two */", HighlightClass::Comment),
                ("b", HighlightClass::ParserRule),
            ]
        );
    }

    #[test]
    fn nested_action_braces() {
        let mut spans = Vec::new();
        let state = highlight_line("a : {x{y", LineState::default(), &mut spans);
        assert_eq!(state.action_depth, 2);
        spans.clear();
        let state = highlight_line("} '}' } b", state, &mut spans);
        assert_eq!(state, LineState::default());
        assert_eq!(spans[0], span(0, 7, HighlightClass::Action));
        assert_eq!(spans[1], span(8, 9, HighlightClass::ParserRule));
    }

    #[test]
    fn restarting_yields_the_same_spans() {
        let text = "s : A ; // end\nA : 'a' ;";
        assert_eq!(highlight(text).collect::<Vec<_>>(), highlight(text).collect::<Vec<_>>());
    }
}
