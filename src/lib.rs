//! Headlights: interpret ANTLR-style grammars without code generation.
//!
//! A grammar document is compiled at run time into a [`GrammarModel`] and run
//! directly over an input document, producing a token list (lexer-only
//! grammars) or a parse tree, together with errors attributed to the document
//! they belong to. [`highlight`] colors grammar text independently of
//! compilation.
//!
//! ```
//! let result = headlights::interpret("DIGITS : [0-9]+ ; WS : ' ' ;", "12 34");
//! assert!(result.is_success());
//! assert_eq!(result.tokens().map(|tokens| tokens.len()), Some(3));
//! ```

pub mod cli;
pub mod engine;
pub mod errors;
pub mod grammar;
pub mod highlight;
pub mod runtime;
pub mod source;

pub use engine::{
    interpret, CancellationToken, InterpretationJob, InterpretationResult, Interpreter, InterpreterConfig,
    ResultCache,
};
pub use errors::{ErrorKind, ErrorList, ErrorMessage, ErrorSource, Focus, HeadlightsError};
pub use grammar::{compile, Compiler, GrammarModel};
pub use highlight::{highlight, HighlightClass, HighlightSpan, HighlightedDocument, LineState};
pub use runtime::{Analysis, ErrorNode, LexerToken, ParseNode};
