//! Source-attributed error records handed to callers.

use std::any::Any;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;

use super::{ErrorKind, HeadlightsError};
use crate::source::{Position, Span};

/// Which document an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSource {
    /// The grammar definition.
    Grammar,
    /// The sample input being interpreted.
    Text,
    /// Not attributable to either document.
    Unknown,
}

impl ErrorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSource::Grammar => "GRAMMAR",
            ErrorSource::Text => "TEXT",
            ErrorSource::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized error. `line` and `column` are 1-based, or -1 when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorMessage {
    pub line: i64,
    pub column: i64,
    pub message: String,
    pub source: ErrorSource,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl ErrorMessage {
    /// An unattributed error with no position.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            line: -1,
            column: -1,
            message: message.into(),
            source: ErrorSource::Unknown,
            code: "headlights::internal::unknown".into(),
            span: None,
        }
    }

    pub fn position(&self) -> Option<Position> {
        if self.line < 1 || self.column < 1 {
            return None;
        }
        Some(Position::new(self.line as usize, self.column as usize))
    }

    /// Whether a caller may move editor focus to this error.
    pub fn is_navigable(&self) -> bool {
        self.source != ErrorSource::Unknown && self.position().is_some()
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position() {
            Some(position) => write!(f, "{} {}: {}", self.source, position, self.message),
            None => write!(f, "{}: {}", self.source, self.message),
        }
    }
}

/// Normalizes an engine failure into an [`ErrorMessage`].
///
/// Failures attributed to neither document never carry a position, even if
/// one was recorded.
pub fn classify(error: &HeadlightsError) -> ErrorMessage {
    let source = error.kind.document();
    let (line, column, span) = match (source, error.position) {
        (ErrorSource::Unknown, _) | (_, None) => (-1, -1, None),
        (_, Some(position)) => (position.line as i64, position.column as i64, error.span),
    };
    ErrorMessage {
        line,
        column,
        message: error.kind.to_string(),
        source,
        code: error.kind.code(),
        span,
    }
}

/// Normalizes a panic payload caught at the engine boundary.
pub fn classify_panic(payload: Box<dyn Any + Send>) -> ErrorMessage {
    let message = if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "interpreter panicked".to_string()
    };
    classify(&HeadlightsError::unpositioned(ErrorKind::Internal { message }))
}

/// Where a caller should move focus after an interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Focus {
    pub document: ErrorSource,
    pub position: Position,
}

/// Insertion-ordered error list. The first entry governs navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorList(Vec<ErrorMessage>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, message: ErrorMessage) {
        self.0.push(message);
    }

    /// The document and position of the first error, if focus should move.
    pub fn focus(&self) -> Option<Focus> {
        let first = self.0.first()?;
        if !first.is_navigable() {
            return None;
        }
        Some(Focus {
            document: first.source,
            position: first.position()?,
        })
    }

    pub fn into_vec(self) -> Vec<ErrorMessage> {
        self.0
    }
}

impl Deref for ErrorList {
    type Target = [ErrorMessage];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ErrorMessage>> for ErrorList {
    fn from(messages: Vec<ErrorMessage>) -> Self {
        Self(messages)
    }
}

impl FromIterator<ErrorMessage> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ErrorMessage>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ErrorMessage;
    type IntoIter = std::slice::Iter<'a, ErrorMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_error(line: usize, column: usize) -> HeadlightsError {
        HeadlightsError::at(
            ErrorKind::TokenRecognition { text: "#".into() },
            Span::new(0, 1),
            Position::new(line, column),
        )
    }

    #[test]
    fn classify_keeps_position_for_document_errors() {
        let message = classify(&text_error(2, 3));
        assert_eq!(message.source, ErrorSource::Text);
        assert_eq!((message.line, message.column), (2, 3));
        assert_eq!(message.message, "token recognition error at: '#'");
    }

    #[test]
    fn classify_strips_position_from_internal_errors() {
        let mut error = HeadlightsError::internal("bad state");
        error.position = Some(Position::new(1, 1));
        let message = classify(&error);
        assert_eq!(message.source, ErrorSource::Unknown);
        assert_eq!((message.line, message.column), (-1, -1));
        assert!(!message.is_navigable());
    }

    #[test]
    fn panics_become_unknown_errors() {
        let message = classify_panic(Box::new("boom"));
        assert_eq!(message.source, ErrorSource::Unknown);
        assert_eq!(message.message, "internal error: boom");
    }

    #[test]
    fn focus_follows_the_first_error_only() {
        let mut errors = ErrorList::new();
        assert_eq!(errors.focus(), None);

        errors.push(ErrorMessage::unknown("first"));
        errors.push(classify(&text_error(1, 1)));
        assert_eq!(errors.focus(), None);

        let errors: ErrorList = vec![classify(&text_error(4, 2))].into();
        let focus = errors.focus().unwrap();
        assert_eq!(focus.document, ErrorSource::Text);
        assert_eq!(focus.position, Position::new(4, 2));
    }
}
