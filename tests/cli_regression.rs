// Regression tests for the `headlights` binary.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn headlights() -> Command {
    Command::cargo_bin("headlights").unwrap()
}

#[test]
fn parses_a_fixture_as_lisp() {
    headlights()
        .arg("--grammar")
        .arg(fixture_path("expr.g4"))
        .arg("--text")
        .arg(fixture_path("expr.txt"))
        .args(["--format", "lisp"])
        .assert()
        .success()
        .stdout(contains("(prog (stat (expr"));
}

#[test]
fn lexer_grammar_prints_tokens() {
    headlights()
        .arg("--grammar")
        .arg(fixture_path("markup.g4"))
        .arg("--text")
        .arg(fixture_path("markup.txt"))
        .assert()
        .success()
        .stdout(contains("1:1 OPEN '<'").and(contains("COMMENT '<!-- note -->' channel=2")));
}

#[test]
fn text_errors_exit_with_one() {
    let dir = std::env::temp_dir().join("headlights-cli-text-errors");
    fs::create_dir_all(&dir).unwrap();
    let input = dir.join("input.txt");
    fs::write(&input, "1 + ;").unwrap();

    headlights()
        .arg("--grammar")
        .arg(fixture_path("expr.g4"))
        .arg("--text")
        .arg(&input)
        .assert()
        .code(1)
        .stderr(contains("headlights::text::"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn grammar_errors_are_reported_as_diagnostics() {
    let dir = std::env::temp_dir().join("headlights-cli-grammar-errors");
    fs::create_dir_all(&dir).unwrap();
    let grammar = dir.join("bad.g4");
    fs::write(&grammar, "s : A B ;\nA : 'a' ;").unwrap();

    headlights()
        .arg("--grammar")
        .arg(&grammar)
        .assert()
        .code(1)
        .stderr(contains("headlights::grammar::undefined_token").and(contains("undefined token: B")));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unreadable_file_exits_with_two() {
    headlights()
        .args(["--grammar", "tests/fixtures/does-not-exist.g4"])
        .assert()
        .code(2)
        .stderr(contains("cannot read"));
}

#[test]
fn missing_documents_are_empty() {
    headlights()
        .assert()
        .code(1)
        .stderr(contains("grammar defines no rules"));
}

#[test]
fn json_output() {
    headlights()
        .arg("--grammar")
        .arg(fixture_path("json.g4"))
        .arg("--text")
        .arg(fixture_path("json.txt"))
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"rule_names\"").and(contains("\"kind\": \"tree\"")));
}

#[test]
fn highlight_mode_echoes_the_grammar() {
    headlights()
        .arg("--grammar")
        .arg(fixture_path("json.g4"))
        .arg("--highlight")
        .assert()
        .success()
        .stdout(contains("grammar").and(contains("fragment")));
}
