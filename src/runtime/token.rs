use serde::Serialize;

use crate::grammar::{TokenType, EOF};
use crate::source::{Position, Span};

/// One token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LexerToken {
    /// Display name of the token type: the lexer rule name, or the quoted
    /// literal for implicit tokens.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "type_id")]
    pub token_type: TokenType,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    pub channel: usize,
}

impl LexerToken {
    pub(crate) fn eof(at: usize, position: Position) -> Self {
        Self {
            type_name: "EOF".into(),
            token_type: EOF,
            text: String::new(),
            start: at,
            end: at,
            line: position.line,
            column: position.column,
            channel: 0,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }

    /// How error messages quote this token.
    pub fn error_display(&self) -> String {
        if self.is_eof() {
            return "'<EOF>'".to_string();
        }
        format!("'{}'", escape_whitespace(&self.text))
    }
}

/// Makes line breaks and tabs visible in single-line output.
pub fn escape_whitespace(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}
