//! The Headlights Command-Line Interface.
//!
//! Loads the grammar and input documents, interprets them and prints the
//! result. Exit status is 0 for a clean run, 1 when the result carries
//! errors and 2 when a document could not be read.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::debug;
use miette::{IntoDiagnostic, WrapErr};
use simple_logger::SimpleLogger;
use termcolor::{ColorChoice, StandardStream};

use crate::cli::args::HeadlightsArgs;
use crate::cli::output::{print_errors, render_result, write_highlighted, Document};
use crate::engine::Interpreter;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() -> ExitCode {
    let args = HeadlightsArgs::parse();

    if let Err(error) = SimpleLogger::new().with_level(args.log_level()).env().init() {
        eprintln!("cannot install logger: {error}");
    }

    match execute(&args) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: &HeadlightsArgs) -> miette::Result<ExitCode> {
    let grammar_text = read_document(args.grammar.as_deref())?;

    if args.highlight {
        let mut stdout = StandardStream::stdout(ColorChoice::Auto);
        write_highlighted(&mut stdout, &grammar_text).into_diagnostic()?;
        return Ok(ExitCode::SUCCESS);
    }

    let input_text = read_document(args.text.as_deref())?;
    let result = Interpreter::new(args.config()).interpret(&grammar_text, &input_text);
    debug!("{} error(s)", result.errors().len());

    let grammar = Document {
        name: &document_name(args.grammar.as_deref(), "<grammar>"),
        text: &grammar_text,
    };
    let input = Document {
        name: &document_name(args.text.as_deref(), "<text>"),
        text: &input_text,
    };
    print_errors(result.errors(), &grammar, &input);
    print!("{}", render_result(&result, args.format)?);

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

/// Reads a document; an absent path is an empty document.
fn read_document(path: Option<&Path>) -> miette::Result<String> {
    match path {
        None => Ok(String::new()),
        Some(path) => fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot read {}", path.display())),
    }
}

fn document_name(path: Option<&Path>, fallback: &str) -> String {
    path.map_or_else(|| fallback.to_string(), |path| path.display().to_string())
}
