//! Headlights error handling.
//!
//! Failures are produced as [`HeadlightsError`] values by the compiler and the
//! runner, then normalized by [`classify`] into [`ErrorMessage`] records that
//! know which document they belong to.

pub mod message;

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::source::{Position, SourceText, Span};

pub use message::{classify, classify_panic, ErrorList, ErrorMessage, ErrorSource, Focus};

// ============================================================================
// ERROR KINDS
// ============================================================================

/// Everything that can go wrong while compiling a grammar or interpreting text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    // Grammar document
    #[error("syntax error: {message}")]
    GrammarSyntax { message: String },
    #[error("rule {name} redefinition")]
    DuplicateRule { name: String },
    #[error("mode {name} redefinition")]
    DuplicateMode { name: String },
    #[error("reference to undefined rule: {name}")]
    UndefinedRule { name: String },
    #[error("undefined token: {name}")]
    UndefinedToken { name: String },
    #[error("parser rule {name} not allowed in lexer rule {rule}")]
    ParserRuleInLexer { name: String, rule: String },
    #[error("{construct} not allowed in parser rule {rule}")]
    LexerConstructInParser { construct: String, rule: String },
    #[error("fragment is only allowed on lexer rules, not on {rule}")]
    FragmentParserRule { rule: String },
    #[error("{grammar} grammars cannot contain rule {rule}")]
    MisplacedRule { rule: String, grammar: String },
    #[error("parser grammars need an external token vocabulary; use a combined grammar")]
    ParserGrammarUnsupported,
    #[error("grammar imports are not supported: {name}")]
    ImportUnsupported { name: String },
    #[error("unsupported left recursion: {chain}")]
    LeftRecursion { chain: String },
    #[error("left-recursive rule {rule} needs an alternative that is not left-recursive")]
    NoPrimaryAlternative { rule: String },
    #[error("non-fragment lexer rule {rule} can match the empty string")]
    EmptyToken { rule: String },
    #[error("lexer rules must not be recursive: {chain}")]
    RecursiveLexerRule { chain: String },
    #[error("invalid character set {set}: {reason}")]
    InvalidCharSet { set: String, reason: String },
    #[error("invalid literal {literal}: {reason}")]
    InvalidLiteral { literal: String, reason: String },
    #[error("lexer command {command} is not supported")]
    UnknownCommand { command: String },
    #[error("lexer command {command}: {reason}")]
    CommandArgument { command: String, reason: String },
    #[error("undefined lexer mode {name}")]
    UndefinedMode { name: String },
    #[error("undefined channel {name}")]
    UndefinedChannel { name: String },
    #[error("grammar defines no rules")]
    NoRules,
    #[error("start rule {name} is not a parser rule of this grammar")]
    UnknownStartRule { name: String },
    #[error("lexer rule {rule} cannot be compiled: {reason}")]
    PatternCompile { rule: String, reason: String },

    // Input document
    #[error("token recognition error at: '{text}'")]
    TokenRecognition { text: String },
    #[error("mismatched input {found} expecting {expected}")]
    MismatchedInput { found: String, expected: String },
    #[error("extraneous input {found} expecting {expected}")]
    ExtraneousInput { found: String, expected: String },
    #[error("missing {expected} at {found}")]
    MissingToken { expected: String, found: String },
    #[error("no viable alternative at input {found}")]
    NoViableAlternative { found: String },
    #[error("popMode with an empty mode stack at: '{text}'")]
    EmptyModeStack { text: String },

    // Neither document
    #[error("recursion depth limit of {limit} exceeded")]
    RecursionLimit { limit: usize },
    #[error("interpretation cancelled")]
    Cancelled,
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ErrorKind {
    /// The document this kind of failure is attributed to.
    pub fn document(&self) -> ErrorSource {
        match self {
            Self::GrammarSyntax { .. }
            | Self::DuplicateRule { .. }
            | Self::DuplicateMode { .. }
            | Self::UndefinedRule { .. }
            | Self::UndefinedToken { .. }
            | Self::ParserRuleInLexer { .. }
            | Self::LexerConstructInParser { .. }
            | Self::FragmentParserRule { .. }
            | Self::MisplacedRule { .. }
            | Self::ParserGrammarUnsupported
            | Self::ImportUnsupported { .. }
            | Self::LeftRecursion { .. }
            | Self::NoPrimaryAlternative { .. }
            | Self::EmptyToken { .. }
            | Self::RecursiveLexerRule { .. }
            | Self::InvalidCharSet { .. }
            | Self::InvalidLiteral { .. }
            | Self::UnknownCommand { .. }
            | Self::CommandArgument { .. }
            | Self::UndefinedMode { .. }
            | Self::UndefinedChannel { .. }
            | Self::NoRules
            | Self::UnknownStartRule { .. }
            | Self::PatternCompile { .. } => ErrorSource::Grammar,

            Self::TokenRecognition { .. }
            | Self::MismatchedInput { .. }
            | Self::ExtraneousInput { .. }
            | Self::MissingToken { .. }
            | Self::NoViableAlternative { .. }
            | Self::EmptyModeStack { .. } => ErrorSource::Text,

            Self::RecursionLimit { .. } | Self::Cancelled | Self::Internal { .. } => {
                ErrorSource::Unknown
            }
        }
    }

    /// Error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::GrammarSyntax { .. } => "syntax",
            Self::DuplicateRule { .. } => "duplicate_rule",
            Self::DuplicateMode { .. } => "duplicate_mode",
            Self::UndefinedRule { .. } => "undefined_rule",
            Self::UndefinedToken { .. } => "undefined_token",
            Self::ParserRuleInLexer { .. } => "parser_rule_in_lexer",
            Self::LexerConstructInParser { .. } => "lexer_construct_in_parser",
            Self::FragmentParserRule { .. } => "fragment_parser_rule",
            Self::MisplacedRule { .. } => "misplaced_rule",
            Self::ParserGrammarUnsupported => "parser_grammar",
            Self::ImportUnsupported { .. } => "import",
            Self::LeftRecursion { .. } => "left_recursion",
            Self::NoPrimaryAlternative { .. } => "no_primary_alternative",
            Self::EmptyToken { .. } => "empty_token",
            Self::RecursiveLexerRule { .. } => "recursive_lexer_rule",
            Self::InvalidCharSet { .. } => "invalid_char_set",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::UnknownCommand { .. } => "unknown_command",
            Self::CommandArgument { .. } => "command_argument",
            Self::UndefinedMode { .. } => "undefined_mode",
            Self::UndefinedChannel { .. } => "undefined_channel",
            Self::NoRules => "no_rules",
            Self::UnknownStartRule { .. } => "unknown_start_rule",
            Self::PatternCompile { .. } => "pattern_compile",
            Self::TokenRecognition { .. } => "token_recognition",
            Self::MismatchedInput { .. } => "mismatched_input",
            Self::ExtraneousInput { .. } => "extraneous_input",
            Self::MissingToken { .. } => "missing_token",
            Self::NoViableAlternative { .. } => "no_viable_alternative",
            Self::EmptyModeStack { .. } => "empty_mode_stack",
            Self::RecursionLimit { .. } => "recursion_limit",
            Self::Cancelled => "cancelled",
            Self::Internal { .. } => "internal",
        }
    }

    /// Full diagnostic code, e.g. `headlights::text::mismatched_input`.
    pub fn code(&self) -> String {
        let phase = match self.document() {
            ErrorSource::Grammar => "grammar",
            ErrorSource::Text => "text",
            ErrorSource::Unknown => "internal",
        };
        format!("headlights::{}::{}", phase, self.code_suffix())
    }
}

// ============================================================================
// THE ERROR TYPE
// ============================================================================

/// A failure with an optional location in the document it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct HeadlightsError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub position: Option<Position>,
}

impl HeadlightsError {
    /// An error without any location.
    pub fn unpositioned(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            position: None,
        }
    }

    /// An error whose position is already known, e.g. from the pest parser.
    pub fn at(kind: ErrorKind, span: Span, position: Position) -> Self {
        Self {
            kind,
            span: Some(span),
            position: Some(position),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::unpositioned(ErrorKind::Internal {
            message: message.into(),
        })
    }

    pub fn document(&self) -> ErrorSource {
        self.kind.document()
    }
}

impl Diagnostic for HeadlightsError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match &self.kind {
            ErrorKind::LeftRecursion { .. } => {
                "only a rule that starts an alternative with itself is supported, e.g. `expr : expr '+' expr | INT ;`"
            }
            ErrorKind::NoPrimaryAlternative { .. } => "add an alternative such as `INT` that starts with something else",
            ErrorKind::ParserGrammarUnsupported => {
                "declare the grammar as `grammar Name;` and add the lexer rules to it"
            }
            ErrorKind::EmptyToken { .. } => "make the rule a fragment or require at least one character",
            ErrorKind::Internal { .. } => "this is an engine bug, please report it",
            _ => return None,
        };
        Some(Box::new(help))
    }
}

// ============================================================================
// CONTEXT-AWARE CONSTRUCTION
// ============================================================================

/// Implemented by the compile and run contexts, which know the document an
/// error belongs to and can turn byte spans into positions.
pub trait ErrorReporting {
    fn source_text(&self) -> &SourceText<'_>;

    fn report(&self, kind: ErrorKind, span: Span) -> HeadlightsError {
        let position = self.source_text().position(span.start);
        HeadlightsError::at(kind, span, position)
    }

    fn undefined_rule(&self, name: &str, span: Span) -> HeadlightsError {
        self.report(
            ErrorKind::UndefinedRule {
                name: name.into(),
            },
            span,
        )
    }

    fn undefined_token(&self, name: &str, span: Span) -> HeadlightsError {
        self.report(
            ErrorKind::UndefinedToken {
                name: name.into(),
            },
            span,
        )
    }

    fn invalid_char_set(&self, set: &str, reason: &str, span: Span) -> HeadlightsError {
        self.report(
            ErrorKind::InvalidCharSet {
                set: set.into(),
                reason: reason.into(),
            },
            span,
        )
    }

    fn invalid_literal(&self, literal: &str, reason: &str, span: Span) -> HeadlightsError {
        self.report(
            ErrorKind::InvalidLiteral {
                literal: literal.into(),
                reason: reason.into(),
            },
            span,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_grouped_by_document() {
        assert_eq!(ErrorKind::NoRules.document(), ErrorSource::Grammar);
        assert_eq!(
            ErrorKind::TokenRecognition { text: "#".into() }.document(),
            ErrorSource::Text
        );
        assert_eq!(ErrorKind::Cancelled.document(), ErrorSource::Unknown);
    }

    #[test]
    fn codes_name_the_phase() {
        let kind = ErrorKind::MissingToken {
            expected: "B".into(),
            found: "'<EOF>'".into(),
        };
        assert_eq!(kind.code(), "headlights::text::missing_token");
        assert_eq!(kind.to_string(), "missing B at '<EOF>'");
    }
}
