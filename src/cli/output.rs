//! Handles all user-facing output for the CLI.
//!
//! Results go to stdout in the requested format; errors go to stderr as
//! miette reports annotated against the document they belong to.

use std::fmt::Write as _;
use std::io;

use miette::{IntoDiagnostic, LabeledSpan, MietteDiagnostic, NamedSource, Report};
use serde::Serialize;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::cli::args::Format;
use crate::engine::InterpretationResult;
use crate::errors::{ErrorMessage, ErrorSource};
use crate::grammar::DEFAULT_CHANNEL;
use crate::highlight::{highlight, HighlightClass};
use crate::runtime::{Analysis, LexerToken};

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Serialize)]
struct JsonResult<'a> {
    rule_names: &'a [String],
    #[serde(flatten)]
    result: &'a InterpretationResult,
}

/// Renders the analysis of `result` in `format`. Empty when analysis did not
/// run, except for JSON which always describes the whole result.
pub fn render_result(result: &InterpretationResult, format: Format) -> miette::Result<String> {
    if format == Format::Json {
        let view = JsonResult {
            rule_names: result.rule_names(),
            result,
        };
        return serde_json::to_string_pretty(&view).into_diagnostic();
    }

    let rule_names = result.rule_names();
    let rendered = match (result.analysis(), format) {
        (None, _) => String::new(),
        (Some(Analysis::Tokens(tokens)), _) => render_tokens(tokens.iter()),
        (Some(Analysis::Tree(tree)), Format::Tokens) => render_tokens(tree.leaf_tokens().into_iter()),
        (Some(Analysis::Tree(tree)), Format::Lisp) => format!("{}\n", tree.to_lisp(rule_names)),
        (Some(Analysis::Tree(tree)), _) => tree.outline(rule_names),
    };
    Ok(rendered)
}

/// One token per line: `line:column TYPE 'text'`, plus the channel when it
/// is not the default one.
pub fn render_tokens<'a>(tokens: impl Iterator<Item = &'a LexerToken>) -> String {
    let mut out = String::new();
    for token in tokens {
        let _ = write!(
            out,
            "{}:{} {} {}",
            token.line,
            token.column,
            token.type_name,
            token.error_display()
        );
        if token.channel != DEFAULT_CHANNEL {
            let _ = write!(out, " channel={}", token.channel);
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// ERRORS
// ============================================================================

/// A loaded document: its display name and contents.
pub struct Document<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

/// Builds a miette report for `error`, labelled against whichever document
/// the error is attributed to.
pub fn error_report(error: &ErrorMessage, grammar: &Document<'_>, input: &Document<'_>) -> Report {
    let mut diagnostic = MietteDiagnostic::new(error.message.clone()).with_code(error.code.clone());
    let document = match error.source {
        ErrorSource::Grammar => Some(grammar),
        ErrorSource::Text => Some(input),
        ErrorSource::Unknown => None,
    };
    match (document, error.span) {
        (Some(document), Some(span)) => {
            diagnostic = diagnostic.with_label(LabeledSpan::at(span, error.source.as_str()));
            Report::new(diagnostic).with_source_code(NamedSource::new(document.name, document.text.to_string()))
        }
        _ => Report::new(diagnostic),
    }
}

pub fn print_errors(errors: &[ErrorMessage], grammar: &Document<'_>, input: &Document<'_>) {
    for error in errors {
        eprintln!("{:?}", error_report(error, grammar, input));
    }
}

// ============================================================================
// HIGHLIGHTING
// ============================================================================

fn color_spec(class: HighlightClass) -> ColorSpec {
    let mut spec = ColorSpec::new();
    match class {
        HighlightClass::Keyword => spec.set_fg(Some(Color::Magenta)).set_bold(true),
        HighlightClass::ParserRule => spec.set_fg(Some(Color::Blue)),
        HighlightClass::LexerRule => spec.set_fg(Some(Color::Cyan)),
        HighlightClass::Literal | HighlightClass::CharSet => spec.set_fg(Some(Color::Green)),
        HighlightClass::Comment => spec.set_dimmed(true).set_italic(true),
        HighlightClass::Action => spec.set_fg(Some(Color::Yellow)),
        HighlightClass::Command => spec.set_fg(Some(Color::Magenta)),
        HighlightClass::Operator => spec.set_fg(Some(Color::Red)),
        HighlightClass::Delimiter => spec.set_bold(true),
    };
    spec
}

/// Writes `text` to `out`, colored per highlight span.
pub fn write_highlighted(out: &mut impl WriteColor, text: &str) -> io::Result<()> {
    let mut written = 0;
    for span in highlight(text) {
        out.write_all(text[written..span.start].as_bytes())?;
        out.set_color(&color_spec(span.class))?;
        out.write_all(text[span.start..span.end].as_bytes())?;
        out.reset()?;
        written = span.end;
    }
    out.write_all(text[written..].as_bytes())?;
    if !text.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interpret;
    use termcolor::{Buffer, NoColor};

    #[test]
    fn token_lines() {
        let result = interpret("A : 'a' ; WS : ' ' -> channel(HIDDEN) ;", "a a");
        let rendered = render_result(&result, Format::Tree).unwrap();
        assert_eq!(rendered, "1:1 A 'a'\n1:2 WS ' ' channel=1\n1:3 A 'a'\n");
    }

    #[test]
    fn lisp_and_tokens_of_a_tree() {
        let result = interpret("s : A+ ; A : 'a' ;", "aa");
        assert_eq!(render_result(&result, Format::Lisp).unwrap(), "(s a a)\n");
        assert_eq!(render_result(&result, Format::Tokens).unwrap(), "1:1 A 'a'\n1:2 A 'a'\n");
    }

    #[test]
    fn json_includes_rule_names_and_errors() {
        let result = interpret("s : A B ; A : 'a' ; B : 'b' ;", "a");
        let json: serde_json::Value = serde_json::from_str(&render_result(&result, Format::Json).unwrap()).unwrap();
        assert_eq!(json["rule_names"][0], "s");
        assert_eq!(json["errors"][0]["source"], "TEXT");
        assert_eq!(json["analysis"]["kind"], "tree");
    }

    #[test]
    fn highlighting_preserves_text() {
        let mut out = NoColor::new(Vec::new());
        write_highlighted(&mut out, "s : A ; // done").unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "s : A ; // done\n");

        let mut colored = Buffer::ansi();
        write_highlighted(&mut colored, "s : A ;").unwrap();
        assert!(colored.as_slice().len() > "s : A ;\n".len());
    }
}
