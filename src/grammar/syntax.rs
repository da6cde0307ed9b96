//! Grammar Syntax - pest front end
//!
//! Turns `.g4` text into a declaration tree with spans. Literal escapes and
//! character sets are decoded here; everything that needs the whole grammar
//! (name resolution, token types, lookahead) happens in the compiler.

use std::iter::Peekable;
use std::str::Chars;

use pest::error::{InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::errors::{ErrorKind, ErrorReporting, HeadlightsError};
use crate::grammar::model::{GrammarKind, RepeatKind};
use crate::source::{Position, SourceText, Span};

#[derive(Parser)]
#[grammar = "grammar/g4.pest"]
struct G4Parser;

// ============================================================================
// DECLARATION TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub kind: GrammarKind,
    pub name: Ident,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GrammarFile {
    pub header: Option<Header>,
    pub tokens: Vec<Ident>,
    pub channels: Vec<Ident>,
    pub imports: Vec<Ident>,
    /// Declared modes; mode `i + 1` is `modes[i]`, mode 0 is the default mode.
    pub modes: Vec<Ident>,
    pub rules: Vec<RuleDecl>,
}

impl GrammarFile {
    pub fn kind(&self) -> GrammarKind {
        self.header
            .as_ref()
            .map_or(GrammarKind::Combined, |header| header.kind)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RuleDecl {
    pub name: Ident,
    pub fragment: Option<Span>,
    pub mode: usize,
    pub alternatives: Vec<AltDecl>,
    pub span: Span,
}

impl RuleDecl {
    pub fn is_lexer_rule(&self) -> bool {
        is_token_name(&self.name.name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AltDecl {
    pub elements: Vec<ElementDecl>,
    pub label: Option<Ident>,
    pub commands: Vec<CommandDecl>,
    /// `<assoc=right>` in front of the alternative.
    pub right_assoc: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandDecl {
    pub name: Ident,
    pub argument: Option<Ident>,
}

#[derive(Debug, Clone)]
pub(crate) struct ElementDecl {
    pub atom: Atom,
    pub suffix: Option<Suffix>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) enum Atom {
    Ref(Ident),
    Literal(String),
    Range(char, char),
    Set(CharClass),
    Wildcard,
    Not(Vec<SetItem>),
    Group(Vec<AltDecl>),
}

#[derive(Debug, Clone)]
pub(crate) enum SetItem {
    Literal(String, Span),
    Range(char, char),
    Set(CharClass),
    Ref(Ident),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CharClass {
    pub items: Vec<ClassItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ClassItem {
    Range(char, char),
    Property { name: String, negated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Suffix {
    pub kind: RepeatKind,
    pub greedy: bool,
}

/// Whether `<...>` element options contain `assoc=right`.
fn is_right_assoc(options: &str) -> bool {
    options
        .trim_start_matches('<')
        .trim_end_matches('>')
        .split(',')
        .filter_map(|option| option.split_once('='))
        .any(|(key, value)| key.trim() == "assoc" && value.trim() == "right")
}

/// Lexer rule and token names start with an uppercase letter.
pub(crate) fn is_token_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses grammar text. Structural errors abort; decoding errors are
/// collected and returned alongside the (still usable) tree.
pub(crate) fn parse(text: &str) -> Result<(GrammarFile, Vec<HeadlightsError>), HeadlightsError> {
    let mut pairs = G4Parser::parse(Rule::grammar_file, text).map_err(syntax_error)?;
    let file = pairs
        .next()
        .ok_or_else(|| HeadlightsError::internal("grammar parser produced no file"))?;

    let mut builder = SyntaxBuilder {
        source: SourceText::new(text),
        errors: Vec::new(),
        file: GrammarFile::default(),
    };
    builder.build_file(file)?;
    Ok((builder.file, builder.errors))
}

fn syntax_error(error: pest::error::Error<Rule>) -> HeadlightsError {
    let error = error.renamed_rules(describe_rule);
    let (line, column) = match error.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let span = match error.location {
        InputLocation::Pos(pos) => Span::empty(pos),
        InputLocation::Span((start, end)) => Span::new(start, end),
    };
    HeadlightsError::at(
        ErrorKind::GrammarSyntax {
            message: error.variant.message().into_owned(),
        },
        span,
        Position::new(line, column),
    )
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::EOI => "end of grammar",
        Rule::identifier => "identifier",
        Rule::int => "integer",
        Rule::string_literal => "string literal",
        Rule::char_set => "character set",
        Rule::action_block => "action",
        Rule::suffix => "'?', '*' or '+'",
        Rule::element | Rule::alternative | Rule::alt_list => "rule element",
        Rule::alt_label => "alternative label",
        Rule::lexer_commands => "'->'",
        Rule::lexer_command => "lexer command",
        Rule::rule_spec => "rule",
        Rule::mode_spec => "mode declaration",
        Rule::grammar_header => "grammar header",
        Rule::element_options => "element options",
        Rule::option => "option",
        other => return format!("{other:?}"),
    }
    .to_string()
}

// ============================================================================
// TREE BUILDER
// ============================================================================

struct SyntaxBuilder<'src> {
    source: SourceText<'src>,
    errors: Vec<HeadlightsError>,
    file: GrammarFile,
}

impl ErrorReporting for SyntaxBuilder<'_> {
    fn source_text(&self) -> &SourceText<'_> {
        &self.source
    }
}

impl SyntaxBuilder<'_> {
    fn build_file(&mut self, pair: Pair<'_, Rule>) -> Result<(), HeadlightsError> {
        let mut mode = 0;
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::grammar_header => self.file.header = Some(build_header(item)?),
                Rule::tokens_spec => self.file.tokens.extend(identifiers(item)),
                Rule::channels_spec => self.file.channels.extend(identifiers(item)),
                Rule::import_spec => self.file.imports.extend(identifiers(item).next()),
                Rule::mode_spec => {
                    let name = identifiers(item)
                        .next()
                        .ok_or_else(|| HeadlightsError::internal("mode without a name"))?;
                    self.file.modes.push(name);
                    mode = self.file.modes.len();
                }
                Rule::rule_spec => {
                    let rule = self.build_rule(item, mode)?;
                    self.file.rules.push(rule);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn build_rule(&mut self, pair: Pair<'_, Rule>, mode: usize) -> Result<RuleDecl, HeadlightsError> {
        let span = Span::from(pair.as_span());
        let mut fragment = None;
        let mut name = None;
        let mut alternatives = Vec::new();
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::fragment_mod => fragment = Some(Span::from(item.as_span())),
                Rule::identifier if name.is_none() => name = Some(ident(&item)),
                Rule::alt_list => alternatives = self.build_alt_list(item)?,
                _ => {}
            }
        }
        let name = name.ok_or_else(|| HeadlightsError::internal("rule without a name"))?;
        Ok(RuleDecl {
            name,
            fragment,
            mode,
            alternatives,
            span,
        })
    }

    fn build_alt_list(&mut self, pair: Pair<'_, Rule>) -> Result<Vec<AltDecl>, HeadlightsError> {
        pair.into_inner()
            .filter(|item| item.as_rule() == Rule::alternative)
            .map(|item| self.build_alternative(item))
            .collect()
    }

    fn build_alternative(&mut self, pair: Pair<'_, Rule>) -> Result<AltDecl, HeadlightsError> {
        let span = Span::from(pair.as_span());
        let mut elements = Vec::new();
        let mut label = None;
        let mut commands = Vec::new();
        let mut right_assoc = false;
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::element_options => right_assoc = is_right_assoc(item.as_str()),
                Rule::element => {
                    if let Some(element) = self.build_element(item)? {
                        elements.push(element);
                    }
                }
                Rule::alt_label => label = identifiers(item).next(),
                Rule::lexer_commands => {
                    commands = item
                        .into_inner()
                        .map(|command| {
                            let mut parts = command.into_inner();
                            let name = parts.next().map(|p| ident(&p));
                            let argument = parts.next().map(|p| ident(&p));
                            name.map(|name| CommandDecl { name, argument })
                        })
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| HeadlightsError::internal("lexer command without a name"))?;
                }
                _ => {}
            }
        }
        Ok(AltDecl {
            elements,
            label,
            commands,
            right_assoc,
            span,
        })
    }

    /// Returns `None` for actions and predicates, which do not match input.
    fn build_element(&mut self, pair: Pair<'_, Rule>) -> Result<Option<ElementDecl>, HeadlightsError> {
        let span = Span::from(pair.as_span());
        let mut atom = None;
        let mut suffix = None;
        for item in pair.into_inner() {
            match item.as_rule() {
                Rule::action_element => return Ok(None),
                Rule::label => {}
                Rule::suffix => suffix = Some(parse_suffix(item.as_str())),
                _ => atom = self.build_atom(item)?,
            }
        }
        Ok(atom.map(|atom| ElementDecl { atom, suffix, span }))
    }

    /// Returns `None` when the atom could not be decoded; the error is recorded.
    fn build_atom(&mut self, pair: Pair<'_, Rule>) -> Result<Option<Atom>, HeadlightsError> {
        let span = Span::from(pair.as_span());
        let atom = match pair.as_rule() {
            Rule::rule_ref => identifiers(pair).next().map(Atom::Ref),
            Rule::string_literal => self.decode_literal(pair.as_str(), span).map(Atom::Literal),
            Rule::char_set => self.decode_char_set(pair.as_str(), span).map(Atom::Set),
            Rule::range => self.build_range(pair).map(|(lo, hi)| Atom::Range(lo, hi)),
            Rule::wildcard => Some(Atom::Wildcard),
            Rule::not_set => {
                let mut items = Vec::new();
                for item in pair.into_inner() {
                    if item.as_rule() == Rule::set_group {
                        for inner in item.into_inner() {
                            items.extend(self.build_set_item(inner));
                        }
                    } else {
                        items.extend(self.build_set_item(item));
                    }
                }
                Some(Atom::Not(items))
            }
            Rule::group => {
                let alt_list = pair
                    .into_inner()
                    .find(|item| item.as_rule() == Rule::alt_list)
                    .ok_or_else(|| HeadlightsError::internal("group without alternatives"))?;
                Some(Atom::Group(self.build_alt_list(alt_list)?))
            }
            other => {
                return Err(HeadlightsError::internal(format!(
                    "unexpected grammar element {other:?}"
                )))
            }
        };
        Ok(atom)
    }

    fn build_set_item(&mut self, pair: Pair<'_, Rule>) -> Option<SetItem> {
        let span = Span::from(pair.as_span());
        match pair.as_rule() {
            Rule::string_literal => self
                .decode_literal(pair.as_str(), span)
                .map(|literal| SetItem::Literal(literal, span)),
            Rule::char_set => self.decode_char_set(pair.as_str(), span).map(SetItem::Set),
            Rule::range => self.build_range(pair).map(|(lo, hi)| SetItem::Range(lo, hi)),
            Rule::rule_ref => identifiers(pair).next().map(SetItem::Ref),
            _ => None,
        }
    }

    fn build_range(&mut self, pair: Pair<'_, Rule>) -> Option<(char, char)> {
        let span = Span::from(pair.as_span());
        let raw = pair.as_str().to_string();
        let mut bounds = Vec::with_capacity(2);
        for literal in pair.into_inner() {
            let literal_span = Span::from(literal.as_span());
            let value = self.decode_literal(literal.as_str(), literal_span)?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => bounds.push(c),
                _ => {
                    let error = self.invalid_literal(
                        literal.as_str(),
                        "range bounds must be single characters",
                        literal_span,
                    );
                    self.errors.push(error);
                    return None;
                }
            }
        }
        match bounds[..] {
            [lo, hi] if lo <= hi => Some((lo, hi)),
            [_, _] => {
                let error = self.invalid_char_set(&raw, "range bounds are reversed", span);
                self.errors.push(error);
                None
            }
            _ => None,
        }
    }

    fn decode_literal(&mut self, raw: &str, span: Span) -> Option<String> {
        let inner = &raw[1..raw.len() - 1];
        if inner.is_empty() {
            let error = self.invalid_literal(raw, "string literals must not be empty", span);
            self.errors.push(error);
            return None;
        }
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                value.push(c);
                continue;
            }
            let decoded = match decode_escape(&mut chars, false) {
                Ok(Escaped::Char(c)) => Ok(c),
                Ok(Escaped::Property { .. }) => Err("properties are only allowed in sets".to_string()),
                Err(reason) => Err(reason),
            };
            match decoded {
                Ok(c) => value.push(c),
                Err(reason) => {
                    let error = self.invalid_literal(raw, &reason, span);
                    self.errors.push(error);
                    return None;
                }
            }
        }
        Some(value)
    }

    fn decode_char_set(&mut self, raw: &str, span: Span) -> Option<CharClass> {
        match decode_class(&raw[1..raw.len() - 1]) {
            Ok(class) => Some(class),
            Err(reason) => {
                let error = self.invalid_char_set(raw, &reason, span);
                self.errors.push(error);
                None
            }
        }
    }
}

fn build_header(pair: Pair<'_, Rule>) -> Result<Header, HeadlightsError> {
    let mut kind = GrammarKind::Combined;
    let mut name = None;
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::grammar_kind => {
                kind = match item.into_inner().next().map(|k| k.as_rule()) {
                    Some(Rule::kw_lexer) => GrammarKind::Lexer,
                    Some(Rule::kw_parser) => GrammarKind::Parser,
                    _ => GrammarKind::Combined,
                }
            }
            Rule::identifier => name = Some(ident(&item)),
            _ => {}
        }
    }
    let name = name.ok_or_else(|| HeadlightsError::internal("grammar header without a name"))?;
    Ok(Header { kind, name })
}

fn ident(pair: &Pair<'_, Rule>) -> Ident {
    Ident {
        name: pair.as_str().to_string(),
        span: Span::from(pair.as_span()),
    }
}

/// Direct identifier children of a pair.
fn identifiers<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Ident> + 'i {
    pair.into_inner()
        .filter(|item| matches!(item.as_rule(), Rule::identifier | Rule::int))
        .map(|item| ident(&item))
}

fn parse_suffix(text: &str) -> Suffix {
    let kind = match text.chars().next() {
        Some('*') => RepeatKind::ZeroOrMore,
        Some('+') => RepeatKind::OneOrMore,
        _ => RepeatKind::Optional,
    };
    Suffix {
        kind,
        greedy: text.len() == 1,
    }
}

// ============================================================================
// ESCAPES AND CHARACTER SETS
// ============================================================================

enum Escaped {
    Char(char),
    Property { name: String, negated: bool },
}

/// Decodes the escape following a backslash.
fn decode_escape(chars: &mut Peekable<Chars<'_>>, in_set: bool) -> Result<Escaped, String> {
    let c = chars.next().ok_or("dangling backslash")?;
    let decoded = match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{8}',
        'f' => '\u{c}',
        '\\' | '\'' | '"' => c,
        'u' => return decode_unicode(chars).map(Escaped::Char),
        ']' | '-' | '[' | '^' if in_set => c,
        'p' | 'P' if in_set => {
            if chars.next() != Some('{') {
                return Err(format!("expected '{{' after \\{c}"));
            }
            let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
            if name.is_empty() {
                return Err(format!("empty property in \\{c}{{}}"));
            }
            return Ok(Escaped::Property {
                name,
                negated: c == 'P',
            });
        }
        other => return Err(format!("invalid escape sequence \\{other}")),
    };
    Ok(Escaped::Char(decoded))
}

fn decode_unicode(chars: &mut Peekable<Chars<'_>>) -> Result<char, String> {
    let digits: String = if chars.peek() == Some(&'{') {
        chars.next();
        let digits: String = chars.by_ref().take_while(|&c| c != '}').collect();
        if digits.is_empty() || digits.len() > 6 {
            return Err("\\u{...} needs 1 to 6 hex digits".to_string());
        }
        digits
    } else {
        let digits: String = chars.by_ref().take(4).collect();
        if digits.len() != 4 {
            return Err("\\u needs 4 hex digits".to_string());
        }
        digits
    };
    u32::from_str_radix(&digits, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| format!("\\u{digits} is not a valid character"))
}

/// Decodes the inside of `[...]`.
fn decode_class(inner: &str) -> Result<CharClass, String> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        let lo = match class_char(c, &mut chars)? {
            Escaped::Char(lo) => lo,
            Escaped::Property { name, negated } => {
                items.push(ClassItem::Property { name, negated });
                continue;
            }
        };
        let mut after_dash = chars.clone();
        if after_dash.next() == Some('-') && after_dash.peek().is_some() {
            chars.next();
            let Some(next) = chars.next() else { break };
            let hi = match class_char(next, &mut chars)? {
                Escaped::Char(hi) => hi,
                Escaped::Property { .. } => return Err("a property cannot bound a range".into()),
            };
            if hi < lo {
                return Err(format!("range {lo}-{hi} is reversed"));
            }
            items.push(ClassItem::Range(lo, hi));
        } else {
            items.push(ClassItem::Range(lo, lo));
        }
    }
    if items.is_empty() {
        return Err("set is empty".to_string());
    }
    Ok(CharClass { items })
}

fn class_char(c: char, chars: &mut Peekable<Chars<'_>>) -> Result<Escaped, String> {
    if c == '\\' {
        decode_escape(chars, true)
    } else {
        Ok(Escaped::Char(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(text: &str) -> GrammarFile {
        let (file, errors) = parse(text).expect("grammar should parse");
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        file
    }

    #[test]
    fn header_and_rules() {
        let file = parse_ok("lexer grammar L;\nA : 'a' ;\nfragment B : [b] ;");
        let header = file.header.as_ref().unwrap();
        assert_eq!(header.kind, GrammarKind::Lexer);
        assert_eq!(header.name.name, "L");
        assert_eq!(file.rules.len(), 2);
        assert!(file.rules[1].fragment.is_some());
    }

    #[test]
    fn modes_number_following_rules() {
        let file = parse_ok("A : 'a' -> pushMode(M) ;\nmode M;\nB : 'b' -> popMode ;");
        assert_eq!(file.modes[0].name, "M");
        assert_eq!(file.rules[0].mode, 0);
        assert_eq!(file.rules[1].mode, 1);
        let command = &file.rules[0].alternatives[0].commands[0];
        assert_eq!(command.name.name, "pushMode");
        assert_eq!(command.argument.as_ref().unwrap().name, "M");
    }

    #[test]
    fn actions_and_labels_are_dropped() {
        let file = parse_ok("r : x=A {print();} B+? {true}? # Lbl ;");
        let alt = &file.rules[0].alternatives[0];
        assert_eq!(alt.elements.len(), 2);
        assert_eq!(alt.label.as_ref().unwrap().name, "Lbl");
        let suffix = alt.elements[1].suffix.unwrap();
        assert_eq!(suffix.kind, RepeatKind::OneOrMore);
        assert!(!suffix.greedy);
    }

    #[test]
    fn associativity_options() {
        let file = parse_ok("e : <assoc=right> e '^' e | e '*' e | INT ;");
        let alternatives = &file.rules[0].alternatives;
        assert!(alternatives[0].right_assoc);
        assert_eq!(alternatives[0].elements.len(), 3);
        assert!(!alternatives[1].right_assoc);
        assert!(is_right_assoc("<fail=x, assoc = right>"));
        assert!(!is_right_assoc("<assoc=left>"));
    }

    #[test]
    fn literal_escapes_decode() {
        let file = parse_ok(r"A : '\n\t\'A\u{1F600}' ;");
        match &file.rules[0].alternatives[0].elements[0].atom {
            Atom::Literal(value) => assert_eq!(value, "\n\t'A\u{1F600}"),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn char_sets_decode_ranges_and_escapes() {
        let class = decode_class(r"a-z_\-\]\p{L}").unwrap();
        assert_eq!(
            class.items,
            vec![
                ClassItem::Range('a', 'z'),
                ClassItem::Range('_', '_'),
                ClassItem::Range('-', '-'),
                ClassItem::Range(']', ']'),
                ClassItem::Property {
                    name: "L".into(),
                    negated: false
                },
            ]
        );
        assert_eq!(
            decode_class("a-").unwrap().items,
            vec![ClassItem::Range('a', 'a'), ClassItem::Range('-', '-')]
        );
        assert!(decode_class("z-a").is_err());
        assert!(decode_class(r"\q").is_err());
    }

    #[test]
    fn unterminated_rule_is_a_syntax_error() {
        let error = parse("grammar G;\nr : A B").unwrap_err();
        assert!(matches!(error.kind, ErrorKind::GrammarSyntax { .. }));
        assert_eq!(error.position.map(|p| p.line), Some(2));
    }

    #[test]
    fn bad_escape_is_collected_not_fatal() {
        let (file, errors) = parse(r"A : '\q' ; B : 'b' ;").unwrap();
        assert_eq!(file.rules.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].kind, ErrorKind::InvalidLiteral { .. }));
    }
}
