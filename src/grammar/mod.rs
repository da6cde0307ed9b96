//! Grammar Compiler
//!
//! Compiles `.g4` grammar text into a [`GrammarModel`] at run time. There is
//! no code generation step: the model is interpreted directly by
//! [`crate::runtime`].

mod compiler;
mod lookahead;
pub mod model;
mod pattern;
mod syntax;

pub use model::{
    Alternative, Block, Element, GrammarKind, GrammarModel, LexerMode, Lookahead, ModeChange,
    Operators, ParserRule, Pattern, Repeat, RepeatKind, RuleInfo, RuleKind, TokenAction,
    TokenMatch, TokenRule, TokenType, Vocabulary, DEFAULT_CHANNEL, DEFAULT_MODE, EOF,
    HIDDEN_CHANNEL,
};

use crate::errors::{classify, ErrorMessage, HeadlightsError};

/// Compiles grammar text with the default start rule (the first parser rule).
///
/// Every returned error has source `GRAMMAR`.
pub fn compile(grammar_text: &str) -> Result<GrammarModel, Vec<ErrorMessage>> {
    Compiler::new().compile(grammar_text)
}

/// Grammar compilation with options.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    start_rule: Option<String>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser rule to start from instead of the first one declared.
    pub fn start_rule(mut self, name: impl Into<String>) -> Self {
        self.start_rule = Some(name.into());
        self
    }

    pub fn compile(&self, grammar_text: &str) -> Result<GrammarModel, Vec<ErrorMessage>> {
        self.compile_raw(grammar_text)
            .map_err(|errors| errors.iter().map(classify).collect())
    }

    /// Like [`Compiler::compile`], but keeps the typed errors for diagnostics.
    pub fn compile_raw(&self, grammar_text: &str) -> Result<GrammarModel, Vec<HeadlightsError>> {
        compiler::compile(grammar_text, self.start_rule.as_deref())
    }
}
