//! Lexer rule translation.
//!
//! Lexer rules are regular, so each one is rewritten as a regular expression
//! with fragments and referenced lexer rules inlined, then compiled with
//! `regex-automata`. Rules without non-greedy operators compile with
//! [`MatchKind::All`] so an anchored half search yields the longest match.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use regex_automata::{meta, MatchKind};

use crate::errors::{ErrorKind, ErrorReporting, HeadlightsError};
use crate::grammar::model::{Pattern, RepeatKind};
use crate::grammar::syntax::{AltDecl, Atom, CharClass, ClassItem, ElementDecl, RuleDecl, SetItem};
use crate::source::{SourceText, Span};

/// A lexer rule body rendered as regex source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Translation {
    pub source: String,
    /// True when a non-greedy operator occurs anywhere in the body,
    /// including inlined fragments.
    pub non_greedy: bool,
}

pub(crate) struct PatternTranslator<'g> {
    source: &'g SourceText<'g>,
    lexer_rules: HashMap<&'g str, &'g RuleDecl>,
    parser_rules: HashSet<&'g str>,
    /// Rules currently being inlined; the first entry is the rule being translated.
    stack: Vec<&'g str>,
    non_greedy: bool,
    errors: Vec<HeadlightsError>,
}

impl ErrorReporting for PatternTranslator<'_> {
    fn source_text(&self) -> &SourceText<'_> {
        self.source
    }
}

impl<'g> PatternTranslator<'g> {
    pub fn new(source: &'g SourceText<'g>, rules: &'g [RuleDecl]) -> Self {
        let mut lexer_rules = HashMap::new();
        let mut parser_rules = HashSet::new();
        for rule in rules {
            if rule.is_lexer_rule() {
                lexer_rules.entry(rule.name.name.as_str()).or_insert(rule);
            } else {
                parser_rules.insert(rule.name.name.as_str());
            }
        }
        Self {
            source,
            lexer_rules,
            parser_rules,
            stack: Vec::new(),
            non_greedy: false,
            errors: Vec::new(),
        }
    }

    /// Translates the given alternatives of `rule`. Errors are only recorded
    /// for constructs written in `rule` itself, so a faulty fragment is
    /// reported once, when the fragment is translated on its own.
    pub fn translate(&mut self, rule: &'g RuleDecl, alternatives: &'g [AltDecl]) -> Translation {
        self.stack.clear();
        self.stack.push(rule.name.name.as_str());
        self.non_greedy = false;
        let source = self.alternatives(alternatives);
        self.stack.clear();
        Translation {
            source,
            non_greedy: self.non_greedy,
        }
    }

    pub fn take_errors(&mut self) -> Vec<HeadlightsError> {
        std::mem::take(&mut self.errors)
    }

    fn record(&mut self, error: HeadlightsError) {
        if self.stack.len() == 1 {
            self.errors.push(error);
        }
    }

    fn alternatives(&mut self, alternatives: &'g [AltDecl]) -> String {
        let parts: Vec<String> = alternatives.iter().map(|alt| self.sequence(&alt.elements)).collect();
        match parts.len() {
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => format!("(?:{})", parts.join("|")),
        }
    }

    fn sequence(&mut self, elements: &'g [ElementDecl]) -> String {
        let mut out = String::new();
        for element in elements {
            out.push_str(&self.element(element));
        }
        out
    }

    fn element(&mut self, element: &'g ElementDecl) -> String {
        let atom = self.atom(&element.atom, element.span);
        let Some(suffix) = element.suffix else {
            return atom;
        };
        let operator = match suffix.kind {
            RepeatKind::Optional => "?",
            RepeatKind::ZeroOrMore => "*",
            RepeatKind::OneOrMore => "+",
        };
        if !suffix.greedy {
            self.non_greedy = true;
        }
        let lazy = if suffix.greedy { "" } else { "?" };
        format!("(?:{atom}){operator}{lazy}")
    }

    fn atom(&mut self, atom: &'g Atom, span: Span) -> String {
        match atom {
            Atom::Literal(text) => group(&regex_syntax::escape(text)),
            Atom::Range(lo, hi) => format!("[{}-{}]", class_char(*lo), class_char(*hi)),
            Atom::Set(class) => format!("[{}]", class_body(class)),
            Atom::Wildcard => "(?s:.)".to_string(),
            Atom::Group(alternatives) => group(&self.alternatives(alternatives)),
            Atom::Not(items) => self.negated(items, span),
            Atom::Ref(name) => self.reference(&name.name, name.span),
        }
    }

    fn reference(&mut self, name: &str, span: Span) -> String {
        let Some(&rule) = self.lexer_rules.get(name) else {
            let error = if self.parser_rules.contains(name) {
                self.report(
                    ErrorKind::ParserRuleInLexer {
                        name: name.into(),
                        rule: self.stack[0].into(),
                    },
                    span,
                )
            } else {
                self.undefined_rule(name, span)
            };
            self.record(error);
            return String::new();
        };

        if let Some(start) = self.stack.iter().position(|&n| n == name) {
            // Only the rule that starts the cycle reports it.
            if start == 0 {
                let mut chain: Vec<&str> = self.stack.clone();
                chain.push(name);
                let error = self.report(
                    ErrorKind::RecursiveLexerRule {
                        chain: chain.join(" -> "),
                    },
                    span,
                );
                self.errors.push(error);
            }
            return String::new();
        }

        self.stack.push(rule.name.name.as_str());
        let body = self.alternatives(&rule.alternatives);
        self.stack.pop();
        group(&body)
    }

    fn negated(&mut self, items: &'g [SetItem], span: Span) -> String {
        let mut body = String::new();
        for item in items {
            match item {
                SetItem::Range(lo, hi) => {
                    let _ = write!(body, "{}-{}", class_char(*lo), class_char(*hi));
                }
                SetItem::Set(class) => body.push_str(&class_body(class)),
                SetItem::Literal(text, literal_span) => {
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => body.push_str(&class_char(c)),
                        _ => {
                            let error = self.invalid_literal(
                                text,
                                "only single characters can be negated",
                                *literal_span,
                            );
                            self.record(error);
                        }
                    }
                }
                SetItem::Ref(name) => match self.set_of(&name.name) {
                    Some(class) => body.push_str(&class),
                    None => {
                        let error = self.invalid_char_set(
                            &name.name,
                            "only rules that match a single character set can be negated",
                            name.span,
                        );
                        self.record(error);
                    }
                },
            }
        }
        if body.is_empty() {
            let error = self.invalid_char_set("~", "nothing to negate", span);
            self.record(error);
            return String::new();
        }
        format!("[^{body}]")
    }

    /// The class body of a lexer rule consisting of one set, range or character.
    fn set_of(&self, name: &str) -> Option<String> {
        let rule = self.lexer_rules.get(name)?;
        let [alt] = &rule.alternatives[..] else {
            return None;
        };
        let [element] = &alt.elements[..] else {
            return None;
        };
        if element.suffix.is_some() {
            return None;
        }
        match &element.atom {
            Atom::Set(class) => Some(class_body(class)),
            Atom::Range(lo, hi) => Some(format!("{}-{}", class_char(*lo), class_char(*hi))),
            Atom::Literal(text) if text.chars().count() == 1 => text.chars().next().map(class_char),
            _ => None,
        }
    }
}

/// Compiles translated regex source.
pub(crate) fn compile(translation: Translation) -> Result<Pattern, String> {
    let longest = !translation.non_greedy;
    let kind = if longest {
        MatchKind::All
    } else {
        MatchKind::LeftmostFirst
    };
    let regex = meta::Regex::builder()
        .configure(meta::Regex::config().match_kind(kind))
        .build(&translation.source)
        .map_err(|error| error.to_string())?;
    Ok(Pattern::new(translation.source, regex, longest))
}

fn group(body: &str) -> String {
    format!("(?:{body})")
}

fn class_body(class: &CharClass) -> String {
    let mut body = String::new();
    for item in &class.items {
        match item {
            ClassItem::Range(lo, hi) if lo == hi => body.push_str(&class_char(*lo)),
            ClassItem::Range(lo, hi) => {
                let _ = write!(body, "{}-{}", class_char(*lo), class_char(*hi));
            }
            ClassItem::Property { name, negated } => {
                let _ = write!(body, "\\{}{{{}}}", if *negated { 'P' } else { 'p' }, name);
            }
        }
    }
    body
}

/// A character safe to place inside a regex class.
fn class_char(c: char) -> String {
    if c.is_alphanumeric() || c == '_' {
        c.to_string()
    } else {
        format!("\\x{{{:X}}}", c as u32)
    }
}
