//! Command-line arguments for the `headlights` binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::engine::{InterpreterConfig, DEFAULT_MAX_DEPTH};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "headlights",
    version,
    about = "Interpret an ANTLR-style grammar against sample input, without code generation."
)]
pub struct HeadlightsArgs {
    /// Grammar file (.g4). An absent file means an empty grammar document.
    #[arg(short, long, value_name = "FILE")]
    pub grammar: Option<PathBuf>,

    /// Input text file. An absent file means an empty input document.
    #[arg(short, long, value_name = "FILE")]
    pub text: Option<PathBuf>,

    /// Parser rule to start from; defaults to the first parser rule.
    #[arg(short, long, value_name = "RULE")]
    pub start: Option<String>,

    /// How to print the result.
    #[arg(short, long, value_enum, default_value_t = Format::Tree)]
    pub format: Format,

    /// Maximum nesting of parser rule invocations.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Print the grammar with syntax highlighting instead of interpreting it.
    #[arg(long)]
    pub highlight: bool,

    /// Raise the log level; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Result rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One token per line.
    Tokens,
    /// Indented tree outline (token list for lexer-only grammars).
    Tree,
    /// LISP-style tree on one line.
    Lisp,
    /// The whole result as JSON.
    Json,
}

impl HeadlightsArgs {
    pub fn config(&self) -> InterpreterConfig {
        let config = InterpreterConfig::default().with_max_depth(self.max_depth);
        match &self.start {
            Some(start) => config.with_start_rule(start.clone()),
            None => config,
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = HeadlightsArgs::parse_from(["headlights"]);
        assert!(args.grammar.is_none());
        assert_eq!(args.format, Format::Tree);
        assert_eq!(args.log_level(), log::LevelFilter::Warn);
        assert_eq!(args.config(), InterpreterConfig::default());
    }

    #[test]
    fn verbosity_and_start_rule() {
        let args = HeadlightsArgs::parse_from(["headlights", "-vv", "--start", "expr", "--format", "lisp"]);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        assert_eq!(args.config().start_rule.as_deref(), Some("expr"));
        assert_eq!(args.format, Format::Lisp);
    }
}
