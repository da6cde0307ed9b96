//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use headlights::{ErrorSource, InterpretationResult};
use walkdir::WalkDir;

/// A grammar fixture and the sample input that goes with it.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: String,
    pub grammar: String,
    pub input: String,
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

/// Every `*.g4` under `tests/fixtures`, paired with the `.txt` file of the
/// same name (an empty input if there is none).
pub fn load_fixtures() -> Vec<Fixture> {
    let mut fixtures = Vec::new();
    for entry in WalkDir::new(fixtures_dir()).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "g4") {
            continue;
        }
        let grammar = fs::read_to_string(path).expect("fixture grammar is readable");
        let input = fs::read_to_string(path.with_extension("txt")).unwrap_or_default();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        fixtures.push(Fixture { name, grammar, input });
    }
    fixtures
}

pub fn fixture(name: &str) -> Fixture {
    load_fixtures()
        .into_iter()
        .find(|fixture| fixture.name == name)
        .unwrap_or_else(|| panic!("no fixture named {name}"))
}

/// `(type, text)` for every token of a lexer-only result.
pub fn token_pairs(result: &InterpretationResult) -> Vec<(String, String)> {
    result
        .tokens()
        .expect("result has a token list")
        .iter()
        .map(|token| (token.type_name.clone(), token.text.clone()))
        .collect()
}

pub fn lisp(result: &InterpretationResult) -> String {
    result
        .tree()
        .expect("result has a parse tree")
        .to_lisp(result.rule_names())
}

pub fn error_sources(result: &InterpretationResult) -> Vec<ErrorSource> {
    result.errors().iter().map(|error| error.source).collect()
}

pub fn messages(result: &InterpretationResult) -> Vec<String> {
    result.errors().iter().map(|error| error.message.clone()).collect()
}

#[track_caller]
pub fn assert_clean(result: &InterpretationResult) {
    assert!(result.is_success(), "unexpected errors: {:#?}", result.errors());
}
