//! Interpreter Runner
//!
//! Executes a compiled [`GrammarModel`] over input text. Lexing always runs;
//! parsing runs only for grammars that define parser rules.

pub mod lexer;
pub mod parser;
pub mod token;
pub mod tree;

use log::debug;
use serde::Serialize;

pub use lexer::{Lexed, Lexer};
pub use parser::Parser;
pub use token::LexerToken;
pub use tree::{ErrorNode, ParseNode};

use crate::engine::CancellationToken;
use crate::errors::{classify, ErrorList, HeadlightsError};
use crate::grammar::GrammarModel;
use crate::source::SourceText;

/// The outcome of analysis: a token list for lexer-only grammars, a parse
/// tree otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Analysis {
    Tokens(Vec<LexerToken>),
    Tree(ParseNode),
}

impl Analysis {
    pub fn tokens(&self) -> Option<&[LexerToken]> {
        match self {
            Analysis::Tokens(tokens) => Some(tokens),
            Analysis::Tree(_) => None,
        }
    }

    pub fn tree(&self) -> Option<&ParseNode> {
        match self {
            Analysis::Tree(tree) => Some(tree),
            Analysis::Tokens(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_depth: usize,
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_depth: crate::engine::DEFAULT_MAX_DEPTH,
            cancel: CancellationToken::new(),
        }
    }
}

/// Runs a compiled grammar over `input` with default options.
///
/// Returns no analysis only when the run could not complete, in which case
/// the error list holds the single reason.
pub fn run(model: &GrammarModel, input: &str) -> (Option<Analysis>, ErrorList) {
    match run_with(model, input, &RunOptions::default()) {
        Ok((analysis, errors)) => (Some(analysis), errors.iter().map(classify).collect()),
        Err(fatal) => (None, vec![classify(&fatal)].into()),
    }
}

/// Runs a compiled grammar over `input`.
///
/// Recoverable errors come back next to the analysis, ordered by their
/// position in the input. `Err` means the run was aborted.
pub fn run_with(
    model: &GrammarModel,
    input: &str,
    options: &RunOptions,
) -> Result<(Analysis, Vec<HeadlightsError>), HeadlightsError> {
    let source = SourceText::new(input);
    let Lexed { tokens, mut errors } = Lexer::new(model, &source, &options.cancel).tokenize()?;
    debug!("lexed {} token(s), {} error(s)", tokens.len(), errors.len());

    if model.is_lexer_only() {
        return Ok((Analysis::Tokens(tokens), errors));
    }

    let start_rule = model
        .start_rule()
        .ok_or_else(|| HeadlightsError::internal("grammar has parser rules but no start rule"))?;
    let parser = Parser::new(model, &source, &tokens, &options.cancel, options.max_depth);
    let (tree, parse_errors) = parser.parse(start_rule)?;
    debug!("parsed {} with {} error(s)", model.rule_names()[start_rule], parse_errors.len());

    errors.extend(parse_errors);
    errors.sort_by_key(|error| error.span.map_or(usize::MAX, |span| span.start));
    Ok((Analysis::Tree(tree), errors))
}
