//! The compiled, executable form of a grammar.
//!
//! A [`GrammarModel`] is built once per compile and never mutated afterwards.
//! The lexer side is a list of modes holding compiled token rules; the parser
//! side is a list of rules whose bodies are blocks of alternatives annotated
//! with one-token lookahead sets.

use std::collections::BTreeSet;
use std::fmt;

use regex_automata::{meta, Anchored, Input};
use serde::Serialize;

use crate::source::Span;

/// Numeric token type. `0` is always end of input.
pub type TokenType = usize;

/// Token type of the end-of-input token.
pub const EOF: TokenType = 0;

pub const DEFAULT_MODE: &str = "DEFAULT_MODE";
pub const DEFAULT_CHANNEL: usize = 0;
pub const HIDDEN_CHANNEL: usize = 1;

// ============================================================================
// GRAMMAR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrammarKind {
    /// `grammar X;` or no header at all.
    Combined,
    /// `lexer grammar X;`
    Lexer,
    /// `parser grammar X;`
    Parser,
}

impl GrammarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrammarKind::Combined => "combined",
            GrammarKind::Lexer => "lexer",
            GrammarKind::Parser => "parser",
        }
    }
}

/// Whether a declared rule belongs to the lexer or the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleKind {
    Lexer { fragment: bool, mode: usize },
    Parser { index: usize },
}

/// One declared rule, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleInfo {
    pub name: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub span: Span,
}

impl RuleInfo {
    pub fn is_parser_rule(&self) -> bool {
        matches!(self.kind, RuleKind::Parser { .. })
    }
}

/// The compiled grammar.
#[derive(Debug, Clone)]
pub struct GrammarModel {
    pub(crate) name: Option<String>,
    pub(crate) kind: GrammarKind,
    pub(crate) rules: Vec<RuleInfo>,
    pub(crate) rule_names: Vec<String>,
    pub(crate) parser_rules: Vec<ParserRule>,
    pub(crate) start_rule: Option<usize>,
    pub(crate) vocabulary: Vocabulary,
    pub(crate) modes: Vec<LexerMode>,
    pub(crate) channels: Vec<String>,
}

impl GrammarModel {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> GrammarKind {
        self.kind
    }

    /// True iff the grammar declares no parser rules.
    pub fn is_lexer_only(&self) -> bool {
        self.parser_rules.is_empty()
    }

    /// Every declared rule, lexer and parser, in declaration order.
    pub fn rules(&self) -> &[RuleInfo] {
        &self.rules
    }

    /// Parser rule names indexed by rule index, as used by [`ParseNode::Rule`].
    ///
    /// [`ParseNode::Rule`]: crate::runtime::ParseNode::Rule
    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    pub fn parser_rules(&self) -> &[ParserRule] {
        &self.parser_rules
    }

    pub fn parser_rule(&self, index: usize) -> Option<&ParserRule> {
        self.parser_rules.get(index)
    }

    pub fn parser_rule_index(&self, name: &str) -> Option<usize> {
        self.rule_names.iter().position(|n| n == name)
    }

    pub fn start_rule(&self) -> Option<usize> {
        self.start_rule
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn modes(&self) -> &[LexerMode] {
        &self.modes
    }

    /// Channel names indexed by channel number.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

// ============================================================================
// VOCABULARY
// ============================================================================

/// Token type display names. Implicit tokens display as their quoted literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    names: Vec<String>,
}

impl Vocabulary {
    pub(crate) fn new() -> Self {
        Self {
            names: vec!["EOF".to_string()],
        }
    }

    pub(crate) fn add(&mut self, name: impl Into<String>) -> TokenType {
        self.names.push(name.into());
        self.names.len() - 1
    }

    pub fn display_name(&self, token_type: TokenType) -> &str {
        self.names
            .get(token_type)
            .map_or("<invalid>", String::as_str)
    }

    pub fn token_type(&self, name: &str) -> Option<TokenType> {
        self.names.iter().position(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every token type except end of input.
    pub fn all_tokens(&self) -> BTreeSet<TokenType> {
        (1..self.names.len()).collect()
    }

    /// Formats an expectation the way error messages show it.
    pub fn describe(&self, expected: &BTreeSet<TokenType>) -> String {
        match expected.len() {
            0 => "nothing".to_string(),
            1 => self.display_name(*expected.iter().next().unwrap_or(&EOF)).to_string(),
            _ => {
                let names: Vec<&str> = expected.iter().map(|&t| self.display_name(t)).collect();
                format!("{{{}}}", names.join(", "))
            }
        }
    }
}

// ============================================================================
// LEXER
// ============================================================================

#[derive(Debug, Clone)]
pub struct LexerMode {
    pub name: String,
    pub rules: Vec<TokenRule>,
}

/// A non-fragment lexer rule (or one alternative of it) ready to match.
#[derive(Debug, Clone)]
pub struct TokenRule {
    pub name: String,
    pub token_type: TokenType,
    pub pattern: Pattern,
    pub action: TokenAction,
}

/// What happens after a token rule matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenAction {
    pub skip: bool,
    pub more: bool,
    pub retype: Option<TokenType>,
    pub channel: usize,
    pub mode_changes: Vec<ModeChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    Set(usize),
    Push(usize),
    Pop,
}

/// A lexer rule translated to a regular expression.
///
/// Rules without non-greedy operators match the longest possible text;
/// rules with them follow the non-greedy operators' preference.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: meta::Regex,
    longest: bool,
}

impl Pattern {
    pub(crate) fn new(source: String, regex: meta::Regex, longest: bool) -> Self {
        Self {
            source,
            regex,
            longest,
        }
    }

    /// The translated regular expression.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_longest_match(&self) -> bool {
        self.longest
    }

    /// End offset of the match anchored at `at`, if any.
    pub fn match_at(&self, haystack: &str, at: usize) -> Option<usize> {
        let input = Input::new(haystack)
            .range(at..)
            .anchored(Anchored::Yes);
        if self.longest {
            self.regex.search_half(&input).map(|m| m.offset())
        } else {
            self.regex.search(&input).map(|m| m.end())
        }
    }

    pub fn matches_empty(&self) -> bool {
        self.match_at("", 0).is_some()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("source", &self.source)
            .field("longest", &self.longest)
            .finish()
    }
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone)]
pub struct ParserRule {
    pub name: String,
    pub index: usize,
    /// For a directly left-recursive rule, only the alternatives that do not
    /// start with the rule itself.
    pub block: Block,
    pub operators: Option<Operators>,
    pub span: Span,
}

/// The left-recursive alternatives of a rule, with the leading
/// self-reference removed. Each one extends an already parsed left operand.
#[derive(Debug, Clone, Default)]
pub struct Operators {
    pub block: Block,
    /// Precedence of each alternative in `block`. Earlier alternatives in the
    /// rule bind tighter and get higher numbers.
    pub precedence: Vec<usize>,
}

impl Operators {
    /// The first operator alternative that can start with `token_type` and
    /// binds at least as tightly as `min_precedence`.
    pub fn predict(&self, token_type: TokenType, min_precedence: usize) -> Option<usize> {
        self.block
            .alternatives
            .iter()
            .zip(&self.precedence)
            .position(|(alt, &level)| level >= min_precedence && alt.lookahead.accepts(token_type))
    }
}

/// Tokens that can start a construct, and whether it can match nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookahead {
    pub first: BTreeSet<TokenType>,
    pub nullable: bool,
}

impl Lookahead {
    pub fn accepts(&self, token_type: TokenType) -> bool {
        self.first.contains(&token_type)
    }
}

/// A choice between alternatives.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub alternatives: Vec<Alternative>,
    pub lookahead: Lookahead,
}

impl Block {
    /// Picks the alternative that governs for the given lookahead token: the
    /// first one that can start with it, else the first that can match nothing.
    pub fn predict(&self, token_type: TokenType) -> Option<usize> {
        self.alternatives
            .iter()
            .position(|alt| alt.lookahead.accepts(token_type))
            .or_else(|| self.alternatives.iter().position(|alt| alt.lookahead.nullable))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Alternative {
    pub elements: Vec<Element>,
    pub label: Option<String>,
    pub lookahead: Lookahead,
}

#[derive(Debug, Clone)]
pub enum Element {
    Terminal(TokenMatch),
    Rule(usize),
    /// Invocation of a left-recursive rule that only accepts operators
    /// binding at least as tightly as `precedence`.
    Operand { rule: usize, precedence: usize },
    Block(Block),
    Repeat(Repeat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMatch {
    Type(TokenType),
    /// `.`: any token except end of input.
    Any,
    /// `~(A | B)`: any token except end of input and the listed ones.
    NotIn(BTreeSet<TokenType>),
}

impl TokenMatch {
    pub fn matches(&self, token_type: TokenType) -> bool {
        match self {
            TokenMatch::Type(t) => *t == token_type,
            TokenMatch::Any => token_type != EOF,
            TokenMatch::NotIn(set) => token_type != EOF && !set.contains(&token_type),
        }
    }

    /// The token types this terminal accepts.
    pub fn first(&self, vocabulary: &Vocabulary) -> BTreeSet<TokenType> {
        match self {
            TokenMatch::Type(t) => BTreeSet::from([*t]),
            TokenMatch::Any => vocabulary.all_tokens(),
            TokenMatch::NotIn(set) => vocabulary
                .all_tokens()
                .into_iter()
                .filter(|t| !set.contains(t))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// `?`
    Optional,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

#[derive(Debug, Clone)]
pub struct Repeat {
    pub body: Block,
    pub kind: RepeatKind,
    pub greedy: bool,
    /// Tokens that can follow the loop within its alternative. A non-greedy
    /// loop stops as soon as the current token is one of them.
    pub exit: Lookahead,
}
