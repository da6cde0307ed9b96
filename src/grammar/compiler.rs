//! Semantic analysis: declaration tree to [`GrammarModel`].
//!
//! All checks run to completion so that every defect in the grammar is
//! reported at once; a model is only handed out when none were found.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::errors::{ErrorKind, ErrorReporting, HeadlightsError};
use crate::grammar::lookahead::{left_recursion, LookaheadTable};
use crate::grammar::model::{
    Alternative, Block, Element, GrammarKind, GrammarModel, LexerMode, Lookahead, ModeChange,
    Operators, ParserRule, Repeat, RuleInfo, RuleKind, TokenAction, TokenMatch, TokenRule,
    TokenType, Vocabulary, DEFAULT_CHANNEL, DEFAULT_MODE, EOF,
};
use crate::grammar::pattern::{self, PatternTranslator, Translation};
use crate::grammar::syntax::{self, AltDecl, Atom, ElementDecl, GrammarFile, Ident, RuleDecl, SetItem};
use crate::source::{SourceText, Span};

const CHANNEL_NAMES: [&str; 2] = ["DEFAULT_TOKEN_CHANNEL", "HIDDEN"];

/// Compiles grammar text, returning every defect found on failure.
pub(crate) fn compile(text: &str, start_rule: Option<&str>) -> Result<GrammarModel, Vec<HeadlightsError>> {
    let (file, syntax_errors) = syntax::parse(text).map_err(|error| vec![error])?;
    let source = SourceText::new(text);

    let mut builder = ModelBuilder::new(&source, &file);
    builder.errors.extend(syntax_errors);
    let model = builder.build(start_rule);

    let mut errors = builder.errors;
    if errors.is_empty() {
        debug!(
            "compiled {} grammar {}: {} parser rules, {} token types, {} modes",
            model.kind.as_str(),
            model.name.as_deref().unwrap_or("<unnamed>"),
            model.parser_rules.len(),
            model.vocabulary.len() - 1,
            model.modes.len()
        );
        return Ok(model);
    }
    errors.sort_by_key(|error| error.span.map_or(usize::MAX, |span| span.start));
    debug!("grammar rejected with {} error(s)", errors.len());
    Err(errors)
}

struct ModelBuilder<'g> {
    source: &'g SourceText<'g>,
    file: &'g GrammarFile,
    errors: Vec<HeadlightsError>,
    vocabulary: Vocabulary,
    /// Literal text to the token type that matches it.
    literals: HashMap<String, TokenType>,
    parser_index: HashMap<&'g str, usize>,
    channels: Vec<String>,
}

impl ErrorReporting for ModelBuilder<'_> {
    fn source_text(&self) -> &SourceText<'_> {
        self.source
    }
}

impl<'g> ModelBuilder<'g> {
    fn new(source: &'g SourceText<'g>, file: &'g GrammarFile) -> Self {
        let channels = CHANNEL_NAMES
            .iter()
            .map(|name| name.to_string())
            .chain(file.channels.iter().map(|channel| channel.name.clone()))
            .collect();
        Self {
            source,
            file,
            errors: Vec::new(),
            vocabulary: Vocabulary::new(),
            literals: HashMap::new(),
            parser_index: HashMap::new(),
            channels,
        }
    }

    fn build(&mut self, start_rule: Option<&str>) -> GrammarModel {
        let rules = self.check_declarations();
        let (lexer_rules, parser_rules): (Vec<&'g RuleDecl>, Vec<&'g RuleDecl>) =
            rules.iter().copied().partition(|rule| rule.is_lexer_rule());

        for (index, &rule) in parser_rules.iter().enumerate() {
            self.parser_index.insert(rule.name.name.as_str(), index);
        }

        let implicit = self.declare_tokens(&lexer_rules, &parser_rules);
        let modes = self.build_modes(&lexer_rules, implicit);
        let parser_rules = self.build_parser_rules(&parser_rules);
        let start_rule = self.start_rule(start_rule, &parser_rules);

        let infos = rules
            .iter()
            .map(|rule| RuleInfo {
                name: rule.name.name.clone(),
                kind: match self.parser_index.get(rule.name.name.as_str()) {
                    Some(&index) if !rule.is_lexer_rule() => RuleKind::Parser { index },
                    _ => RuleKind::Lexer {
                        fragment: rule.fragment.is_some(),
                        mode: rule.mode,
                    },
                },
                span: rule.span,
            })
            .collect();

        GrammarModel {
            name: self.file.header.as_ref().map(|header| header.name.name.clone()),
            kind: self.file.kind(),
            rules: infos,
            rule_names: parser_rules.iter().map(|rule| rule.name.clone()).collect(),
            parser_rules,
            start_rule,
            vocabulary: std::mem::replace(&mut self.vocabulary, Vocabulary::new()),
            modes,
            channels: std::mem::take(&mut self.channels),
        }
    }

    // ========================================================================
    // DECLARATIONS
    // ========================================================================

    /// Grammar-level checks. Returns the first definition of every rule.
    fn check_declarations(&mut self) -> Vec<&'g RuleDecl> {
        let file = self.file;
        let kind = file.kind();

        if kind == GrammarKind::Parser {
            let span = file.header.as_ref().map_or(Span::empty(0), |h| h.name.span);
            let error = self.report(ErrorKind::ParserGrammarUnsupported, span);
            self.errors.push(error);
        }
        for import in &file.imports {
            let error = self.report(
                ErrorKind::ImportUnsupported {
                    name: import.name.clone(),
                },
                import.span,
            );
            self.errors.push(error);
        }
        if file.rules.is_empty() {
            self.errors.push(HeadlightsError::unpositioned(ErrorKind::NoRules));
        }

        let mut modes = HashSet::from([DEFAULT_MODE]);
        for mode in &file.modes {
            if !modes.insert(mode.name.as_str()) {
                let error = self.report(
                    ErrorKind::DuplicateMode {
                        name: mode.name.clone(),
                    },
                    mode.span,
                );
                self.errors.push(error);
            }
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for rule in &file.rules {
            let name = rule.name.name.as_str();
            if !seen.insert(name) {
                let error = self.report(ErrorKind::DuplicateRule { name: name.into() }, rule.name.span);
                self.errors.push(error);
                continue;
            }
            unique.push(rule);

            let misplaced = match (kind, rule.is_lexer_rule()) {
                (GrammarKind::Lexer, false) => Some("lexer"),
                (GrammarKind::Parser, true) => Some("parser"),
                _ => None,
            };
            if let Some(grammar) = misplaced {
                let error = self.report(
                    ErrorKind::MisplacedRule {
                        rule: name.into(),
                        grammar: grammar.into(),
                    },
                    rule.name.span,
                );
                self.errors.push(error);
            }
            if let (Some(span), false) = (rule.fragment, rule.is_lexer_rule()) {
                let error = self.report(ErrorKind::FragmentParserRule { rule: name.into() }, span);
                self.errors.push(error);
            }
        }
        unique
    }

    /// Assigns token types: `tokens {}` entries, then implicit literal tokens
    /// from parser rules, then lexer rules. Returns the implicit literals.
    fn declare_tokens(
        &mut self,
        lexer_rules: &[&'g RuleDecl],
        parser_rules: &[&'g RuleDecl],
    ) -> Vec<(&'g str, TokenType)> {
        for token in &self.file.tokens {
            if self.vocabulary.token_type(&token.name).is_none() {
                self.vocabulary.add(token.name.clone());
            }
        }

        let mut aliases: HashMap<&'g str, &'g str> = HashMap::new();
        for rule in lexer_rules.iter().copied().filter(|rule| rule.fragment.is_none()) {
            if let Some(literal) = sole_literal(rule) {
                aliases.entry(literal).or_insert(rule.name.name.as_str());
            }
        }

        let mut used = Vec::new();
        for &rule in parser_rules {
            collect_literals(&rule.alternatives, &mut used);
        }
        let mut implicit = Vec::new();
        for literal in used {
            if self.literals.contains_key(literal) || aliases.contains_key(literal) {
                continue;
            }
            let token_type = self.vocabulary.add(format!("'{}'", literal.escape_debug()));
            self.literals.insert(literal.to_string(), token_type);
            implicit.push((literal, token_type));
        }

        for rule in lexer_rules.iter().filter(|rule| rule.fragment.is_none()) {
            if self.vocabulary.token_type(&rule.name.name).is_none() {
                self.vocabulary.add(rule.name.name.clone());
            }
        }
        for (literal, name) in aliases {
            if let Some(token_type) = self.vocabulary.token_type(name) {
                self.literals.entry(literal.to_string()).or_insert(token_type);
            }
        }
        implicit
    }

    // ========================================================================
    // LEXER
    // ========================================================================

    fn build_modes(
        &mut self,
        lexer_rules: &[&'g RuleDecl],
        implicit: Vec<(&'g str, TokenType)>,
    ) -> Vec<LexerMode> {
        let mut modes: Vec<LexerMode> = std::iter::once(DEFAULT_MODE.to_string())
            .chain(self.file.modes.iter().map(|mode| mode.name.clone()))
            .map(|name| LexerMode {
                name,
                rules: Vec::new(),
            })
            .collect();

        for (literal, token_type) in implicit {
            let name = self.vocabulary.display_name(token_type).to_string();
            let translation = Translation {
                source: regex_syntax::escape(literal),
                non_greedy: false,
            };
            match pattern::compile(translation) {
                Ok(pattern) => modes[0].rules.push(TokenRule {
                    name,
                    token_type,
                    pattern,
                    action: TokenAction::default(),
                }),
                Err(reason) => self
                    .errors
                    .push(HeadlightsError::unpositioned(ErrorKind::PatternCompile { rule: name, reason })),
            }
        }

        let file = self.file;
        let mut translator = PatternTranslator::new(self.source, &file.rules);
        for &rule in lexer_rules {
            if rule.fragment.is_some() {
                translator.translate(rule, &rule.alternatives);
                self.errors.extend(translator.take_errors());
                continue;
            }

            let actions: Vec<TokenAction> = rule
                .alternatives
                .iter()
                .map(|alt| self.resolve_commands(alt))
                .collect();
            let uniform = actions.windows(2).all(|pair| pair[0] == pair[1]);
            let pieces: Vec<(Translation, TokenAction)> = if uniform {
                let action = actions.into_iter().next().unwrap_or_default();
                vec![(translator.translate(rule, &rule.alternatives), action)]
            } else {
                rule.alternatives
                    .iter()
                    .enumerate()
                    .zip(actions)
                    .map(|((index, _), action)| {
                        (translator.translate(rule, &rule.alternatives[index..=index]), action)
                    })
                    .collect()
            };
            let translation_errors = translator.take_errors();
            let clean = translation_errors.is_empty();
            self.errors.extend(translation_errors);

            let Some(token_type) = self.vocabulary.token_type(&rule.name.name) else {
                continue;
            };
            for (translation, action) in pieces {
                trace!("lexer rule {} => /{}/", rule.name.name, translation.source);
                match pattern::compile(translation) {
                    Ok(pattern) if clean && pattern.matches_empty() => {
                        let error = self.report(
                            ErrorKind::EmptyToken {
                                rule: rule.name.name.clone(),
                            },
                            rule.name.span,
                        );
                        self.errors.push(error);
                    }
                    Ok(pattern) => modes[rule.mode].rules.push(TokenRule {
                        name: rule.name.name.clone(),
                        token_type,
                        pattern,
                        action,
                    }),
                    Err(reason) if clean => {
                        let error = self.report(
                            ErrorKind::PatternCompile {
                                rule: rule.name.name.clone(),
                                reason,
                            },
                            rule.name.span,
                        );
                        self.errors.push(error);
                    }
                    Err(_) => {}
                }
            }
        }
        modes
    }

    fn resolve_commands(&mut self, alt: &'g AltDecl) -> TokenAction {
        let mut action = TokenAction {
            channel: DEFAULT_CHANNEL,
            ..TokenAction::default()
        };
        for command in &alt.commands {
            let name = command.name.name.as_str();
            match (name, &command.argument) {
                ("skip" | "more" | "popMode", Some(argument)) => {
                    self.command_error(name, "takes no argument", argument.span);
                }
                ("skip", None) => action.skip = true,
                ("more", None) => action.more = true,
                ("popMode", None) => action.mode_changes.push(ModeChange::Pop),
                ("type" | "channel" | "mode" | "pushMode", None) => {
                    self.command_error(name, "requires an argument", command.name.span);
                }
                ("type", Some(argument)) => match self.vocabulary.token_type(&argument.name) {
                    Some(token_type) if token_type != EOF => action.retype = Some(token_type),
                    _ => {
                        let error = self.undefined_token(&argument.name, argument.span);
                        self.errors.push(error);
                    }
                },
                ("channel", Some(argument)) => match self.channel(&argument.name) {
                    Some(channel) => action.channel = channel,
                    None => {
                        let error = self.report(
                            ErrorKind::UndefinedChannel {
                                name: argument.name.clone(),
                            },
                            argument.span,
                        );
                        self.errors.push(error);
                    }
                },
                ("mode" | "pushMode", Some(argument)) => match self.mode_index(&argument.name) {
                    Some(mode) if name == "mode" => action.mode_changes.push(ModeChange::Set(mode)),
                    Some(mode) => action.mode_changes.push(ModeChange::Push(mode)),
                    None => {
                        let error = self.report(
                            ErrorKind::UndefinedMode {
                                name: argument.name.clone(),
                            },
                            argument.span,
                        );
                        self.errors.push(error);
                    }
                },
                _ => {
                    let error = self.report(
                        ErrorKind::UnknownCommand {
                            command: name.into(),
                        },
                        command.name.span,
                    );
                    self.errors.push(error);
                }
            }
        }
        action
    }

    fn command_error(&mut self, command: &str, reason: &str, span: Span) {
        let error = self.report(
            ErrorKind::CommandArgument {
                command: command.into(),
                reason: reason.into(),
            },
            span,
        );
        self.errors.push(error);
    }

    fn channel(&self, name: &str) -> Option<usize> {
        if let Ok(number) = name.parse::<usize>() {
            return Some(number);
        }
        self.channels.iter().position(|channel| channel == name)
    }

    fn mode_index(&self, name: &str) -> Option<usize> {
        if name == DEFAULT_MODE {
            return Some(0);
        }
        self.file
            .modes
            .iter()
            .position(|mode| mode.name == name)
            .map(|index| index + 1)
    }

    // ========================================================================
    // PARSER
    // ========================================================================

    fn build_parser_rules(&mut self, decls: &[&'g RuleDecl]) -> Vec<ParserRule> {
        let mut rules: Vec<ParserRule> = decls
            .iter()
            .enumerate()
            .map(|(index, &decl)| self.parser_rule(index, decl))
            .collect();

        let table = LookaheadTable::compute(&rules, &self.vocabulary);
        let cycles = left_recursion(&rules, &table);
        for cycle in cycles {
            let chain: Vec<&str> = cycle.iter().map(|&index| rules[index].name.as_str()).collect();
            let span = decls[cycle[0]].name.span;
            let error = self.report(
                ErrorKind::LeftRecursion {
                    chain: chain.join(" -> "),
                },
                span,
            );
            self.errors.push(error);
        }
        table.annotate(&mut rules);
        rules
    }

    /// A rule whose alternatives start with the rule itself is split into
    /// primary alternatives and an operator loop. Precedence follows the
    /// order of the alternatives, first binding tightest.
    fn parser_rule(&mut self, index: usize, decl: &'g RuleDecl) -> ParserRule {
        let name = decl.name.name.as_str();
        let shapes: Vec<Shape> = decl
            .alternatives
            .iter()
            .map(|alt| Shape::of(decl, alt))
            .collect();
        if !shapes.iter().any(|shape| matches!(shape, Shape::Binary | Shape::Suffix)) {
            return ParserRule {
                name: name.into(),
                index,
                block: self.block(&decl.alternatives, name),
                operators: None,
                span: decl.span,
            };
        }

        let count = decl.alternatives.len();
        let mut primary = Block::default();
        let mut operators = Operators::default();
        for (position, (alt, shape)) in decl.alternatives.iter().zip(shapes).enumerate() {
            let precedence = count - position;
            let elements = &alt.elements[..];
            match shape {
                Shape::Primary => primary.alternatives.push(self.alternative(alt, name)),
                Shape::Prefix => {
                    let operand = Element::Operand { rule: index, precedence };
                    let prefix = &elements[..elements.len() - 1];
                    let alternative = self.alternative_of(alt, prefix, Some(operand), name);
                    primary.alternatives.push(alternative);
                }
                Shape::Suffix if elements.len() == 1 => {
                    let error = self.report(
                        ErrorKind::LeftRecursion {
                            chain: format!("{name} -> {name}"),
                        },
                        alt.span,
                    );
                    self.errors.push(error);
                }
                Shape::Suffix => {
                    let alternative = self.alternative_of(alt, &elements[1..], None, name);
                    operators.block.alternatives.push(alternative);
                    operators.precedence.push(precedence);
                }
                Shape::Binary => {
                    let next = if alt.right_assoc { precedence } else { precedence + 1 };
                    let operand = Element::Operand {
                        rule: index,
                        precedence: next,
                    };
                    let middle = &elements[1..elements.len() - 1];
                    let alternative = self.alternative_of(alt, middle, Some(operand), name);
                    operators.block.alternatives.push(alternative);
                    operators.precedence.push(precedence);
                }
            }
        }
        if primary.alternatives.is_empty() {
            let error = self.report(
                ErrorKind::NoPrimaryAlternative { rule: name.into() },
                decl.name.span,
            );
            self.errors.push(error);
        }
        trace!(
            "rule {name}: {} primary and {} operator alternatives",
            primary.alternatives.len(),
            operators.block.alternatives.len()
        );
        ParserRule {
            name: name.into(),
            index,
            block: primary,
            operators: Some(operators),
            span: decl.span,
        }
    }

    fn block(&mut self, alternatives: &'g [AltDecl], rule: &str) -> Block {
        Block {
            alternatives: alternatives
                .iter()
                .map(|alt| self.alternative(alt, rule))
                .collect(),
            lookahead: Lookahead::default(),
        }
    }

    fn alternative(&mut self, alt: &'g AltDecl, rule: &str) -> Alternative {
        self.alternative_of(alt, &alt.elements, None, rule)
    }

    /// Builds `alt` from a slice of its elements, optionally ending in an operand.
    fn alternative_of(
        &mut self,
        alt: &'g AltDecl,
        elements: &'g [ElementDecl],
        operand: Option<Element>,
        rule: &str,
    ) -> Alternative {
        if let Some(command) = alt.commands.first() {
            self.misplaced_construct("lexer command", rule, command.name.span);
        }
        let mut built: Vec<Element> = elements
            .iter()
            .filter_map(|element| self.element(element, rule))
            .collect();
        built.extend(operand);
        Alternative {
            elements: built,
            label: alt.label.as_ref().map(|label| label.name.clone()),
            lookahead: Lookahead::default(),
        }
    }

    fn element(&mut self, decl: &'g ElementDecl, rule: &str) -> Option<Element> {
        let element = match &decl.atom {
            Atom::Group(alternatives) => Element::Block(self.block(alternatives, rule)),
            Atom::Ref(ident) => self.reference(ident)?,
            Atom::Literal(text) => Element::Terminal(TokenMatch::Type(self.literal(text, decl.span)?)),
            Atom::Wildcard => Element::Terminal(TokenMatch::Any),
            Atom::Range(..) => {
                self.misplaced_construct("character range", rule, decl.span);
                return None;
            }
            Atom::Set(_) => {
                self.misplaced_construct("character set", rule, decl.span);
                return None;
            }
            Atom::Not(items) => {
                let mut excluded = std::collections::BTreeSet::new();
                for item in items {
                    let token_type = match item {
                        SetItem::Literal(text, span) => self.literal(text, *span),
                        SetItem::Ref(ident) => self.token(ident),
                        SetItem::Range(..) => {
                            self.misplaced_construct("character range", rule, decl.span);
                            None
                        }
                        SetItem::Set(_) => {
                            self.misplaced_construct("character set", rule, decl.span);
                            None
                        }
                    };
                    excluded.extend(token_type);
                }
                Element::Terminal(TokenMatch::NotIn(excluded))
            }
        };

        let Some(suffix) = decl.suffix else {
            return Some(element);
        };
        let body = match element {
            Element::Block(block) => block,
            other => Block {
                alternatives: vec![Alternative {
                    elements: vec![other],
                    ..Alternative::default()
                }],
                lookahead: Lookahead::default(),
            },
        };
        Some(Element::Repeat(Repeat {
            body,
            kind: suffix.kind,
            greedy: suffix.greedy,
            exit: Lookahead::default(),
        }))
    }

    fn reference(&mut self, ident: &Ident) -> Option<Element> {
        if syntax::is_token_name(&ident.name) {
            return self.token(ident).map(|t| Element::Terminal(TokenMatch::Type(t)));
        }
        match self.parser_index.get(ident.name.as_str()) {
            Some(&index) => Some(Element::Rule(index)),
            None => {
                let error = self.undefined_rule(&ident.name, ident.span);
                self.errors.push(error);
                None
            }
        }
    }

    fn token(&mut self, ident: &Ident) -> Option<TokenType> {
        if ident.name == "EOF" {
            return Some(EOF);
        }
        let found = self.vocabulary.token_type(&ident.name);
        if found.is_none() {
            let error = self.undefined_token(&ident.name, ident.span);
            self.errors.push(error);
        }
        found
    }

    fn literal(&mut self, text: &str, span: Span) -> Option<TokenType> {
        let found = self.literals.get(text).copied();
        if found.is_none() {
            let error = self.undefined_token(&format!("'{}'", text.escape_debug()), span);
            self.errors.push(error);
        }
        found
    }

    fn misplaced_construct(&mut self, construct: &str, rule: &str, span: Span) {
        let error = self.report(
            ErrorKind::LexerConstructInParser {
                construct: construct.into(),
                rule: rule.into(),
            },
            span,
        );
        self.errors.push(error);
    }

    fn start_rule(&mut self, configured: Option<&str>, rules: &[ParserRule]) -> Option<usize> {
        let Some(name) = configured else {
            return (!rules.is_empty()).then_some(0);
        };
        let index = rules.iter().position(|rule| rule.name == name);
        if index.is_none() {
            self.errors
                .push(HeadlightsError::unpositioned(ErrorKind::UnknownStartRule { name: name.into() }));
        }
        index
    }
}

/// Role of one alternative of a parser rule with respect to direct left
/// recursion. Only a bare, unsuffixed reference to the rule itself counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Neither starts nor ends with the rule: `INT`, `'(' e ')'`.
    Primary,
    /// Ends with the rule: `'-' e`.
    Prefix,
    /// Starts and ends with the rule: `e '+' e`.
    Binary,
    /// Starts with the rule only: `e '++'`, `e '[' e ']'`.
    Suffix,
}

impl Shape {
    fn of(rule: &RuleDecl, alt: &AltDecl) -> Self {
        let is_self = |element: &ElementDecl| {
            element.suffix.is_none()
                && matches!(&element.atom, Atom::Ref(ident) if ident.name == rule.name.name)
        };
        let starts = alt.elements.first().is_some_and(is_self);
        let ends = alt.elements.len() > 1 && alt.elements.last().is_some_and(is_self);
        match (starts, ends) {
            (true, true) => Shape::Binary,
            (true, false) => Shape::Suffix,
            (false, true) => Shape::Prefix,
            (false, false) => Shape::Primary,
        }
    }
}

/// The literal a lexer rule consists of, if that is all it is.
fn sole_literal(rule: &RuleDecl) -> Option<&str> {
    let [alt] = &rule.alternatives[..] else {
        return None;
    };
    let [element] = &alt.elements[..] else {
        return None;
    };
    match (&element.atom, element.suffix, alt.commands.is_empty()) {
        (Atom::Literal(text), None, true) => Some(text.as_str()),
        _ => None,
    }
}

/// Literals used anywhere in the given alternatives, in order of appearance.
fn collect_literals<'g>(alternatives: &'g [AltDecl], out: &mut Vec<&'g str>) {
    for alt in alternatives {
        for element in &alt.elements {
            match &element.atom {
                Atom::Literal(text) => out.push(text.as_str()),
                Atom::Group(inner) => collect_literals(inner, out),
                Atom::Not(items) => {
                    for item in items {
                        if let SetItem::Literal(text, _) = item {
                            out.push(text.as_str());
                        }
                    }
                }
                Atom::Ref(_) | Atom::Range(..) | Atom::Set(_) | Atom::Wildcard => {}
            }
        }
    }
}
