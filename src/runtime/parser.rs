//! Syntactic analysis.
//!
//! Recursive descent over the compiled rules with one token of lookahead.
//! Errors are recovered one token at a time so the tree always covers the
//! whole invocation of the start rule.

use log::trace;

use crate::engine::CancellationToken;
use crate::errors::{ErrorKind, ErrorReporting, HeadlightsError};
use crate::grammar::{
    Block, Element, GrammarModel, Operators, Repeat, RepeatKind, TokenMatch, TokenType,
    DEFAULT_CHANNEL,
};
use crate::runtime::token::LexerToken;
use crate::runtime::tree::{ErrorNode, ParseNode};
use crate::source::{SourceText, Span};

pub struct Parser<'a> {
    model: &'a GrammarModel,
    source: &'a SourceText<'a>,
    cancel: &'a CancellationToken,
    max_depth: usize,
    /// Default-channel tokens followed by end of input.
    tokens: Vec<&'a LexerToken>,
    eof: LexerToken,
    index: usize,
    depth: usize,
    errors: Vec<HeadlightsError>,
}

impl ErrorReporting for Parser<'_> {
    fn source_text(&self) -> &SourceText<'_> {
        self.source
    }
}

impl<'a> Parser<'a> {
    pub fn new(
        model: &'a GrammarModel,
        source: &'a SourceText<'a>,
        tokens: &'a [LexerToken],
        cancel: &'a CancellationToken,
        max_depth: usize,
    ) -> Self {
        Self {
            model,
            source,
            cancel,
            max_depth,
            tokens: tokens
                .iter()
                .filter(|token| token.channel == DEFAULT_CHANNEL)
                .collect(),
            eof: LexerToken::eof(source.len(), source.end_position()),
            index: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    /// Parses from `start_rule`. Recoverable errors are returned alongside
    /// the tree; the recursion limit and cancellation abort the parse.
    pub fn parse(mut self, start_rule: usize) -> Result<(ParseNode, Vec<HeadlightsError>), HeadlightsError> {
        let tree = self.rule(start_rule)?;
        Ok((tree, self.errors))
    }

    // ========================================================================
    // TOKEN STREAM
    // ========================================================================

    fn current(&self) -> &LexerToken {
        self.tokens.get(self.index).copied().unwrap_or(&self.eof)
    }

    fn lookahead(&self, offset: usize) -> TokenType {
        self.tokens
            .get(self.index + offset)
            .map_or(self.eof.token_type, |token| token.token_type)
    }

    fn la(&self) -> TokenType {
        self.lookahead(0)
    }

    fn consume(&mut self) -> ParseNode {
        let node = ParseNode::Token(self.current().clone());
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        node
    }

    fn consume_as_error(&mut self) -> ParseNode {
        let token = self.current();
        let node = ParseNode::Error(ErrorNode {
            text: token.text.clone(),
            span: token.span(),
        });
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        node
    }

    fn report_at_current(&mut self, kind: ErrorKind) {
        let error = self.report(kind, self.current().span());
        trace!("parse error: {}", error.kind);
        self.errors.push(error);
    }

    // ========================================================================
    // RULES AND BLOCKS
    // ========================================================================

    fn rule(&mut self, index: usize) -> Result<ParseNode, HeadlightsError> {
        self.rule_at(index, 0)
    }

    /// Invokes a rule. For a left-recursive rule, only operators with at least
    /// `precedence` may extend the parsed operand.
    fn rule_at(&mut self, index: usize, precedence: usize) -> Result<ParseNode, HeadlightsError> {
        if self.depth >= self.max_depth {
            return Err(HeadlightsError::unpositioned(ErrorKind::RecursionLimit {
                limit: self.max_depth,
            }));
        }
        if self.cancel.is_cancelled() {
            return Err(HeadlightsError::unpositioned(ErrorKind::Cancelled));
        }
        let model = self.model;
        let rule = model
            .parser_rule(index)
            .ok_or_else(|| HeadlightsError::internal(format!("no parser rule with index {index}")))?;
        trace!("enter {} at {}", rule.name, self.current().position());

        self.depth += 1;
        let mut children = Vec::new();
        self.block(&rule.block, &mut children)?;
        let mut node = ParseNode::Rule {
            rule_index: index,
            children,
        };
        if let Some(operators) = &rule.operators {
            node = self.operators(index, operators, precedence, node)?;
        }
        self.depth -= 1;
        Ok(node)
    }

    /// Each applied operator wraps the tree built so far into a new node of
    /// the same rule, which makes binary operators left-associative unless
    /// the right operand admits the same precedence.
    fn operators(
        &mut self,
        index: usize,
        operators: &'a Operators,
        precedence: usize,
        mut left: ParseNode,
    ) -> Result<ParseNode, HeadlightsError> {
        while let Some(alternative) = operators.predict(self.la(), precedence) {
            if self.cancel.is_cancelled() {
                return Err(HeadlightsError::unpositioned(ErrorKind::Cancelled));
            }
            let before = self.index;
            let mut children = vec![left];
            self.sequence(&operators.block.alternatives[alternative].elements, &mut children)?;
            left = ParseNode::Rule {
                rule_index: index,
                children,
            };
            if self.index == before {
                break;
            }
        }
        Ok(left)
    }

    fn block(&mut self, block: &'a Block, children: &mut Vec<ParseNode>) -> Result<(), HeadlightsError> {
        // A lone alternative is entered unconditionally; its first element
        // reports the mismatch more precisely than prediction could.
        let predicted = match block.alternatives.len() {
            1 => Some(0),
            _ => block.predict(self.la()),
        };
        match predicted {
            Some(alternative) => self.sequence(&block.alternatives[alternative].elements, children),
            None => {
                let found = self.current().error_display();
                self.report_at_current(ErrorKind::NoViableAlternative { found });
                if !self.current().is_eof() {
                    children.push(self.consume_as_error());
                }
                Ok(())
            }
        }
    }

    fn sequence(&mut self, elements: &'a [Element], children: &mut Vec<ParseNode>) -> Result<(), HeadlightsError> {
        for element in elements {
            match element {
                Element::Terminal(terminal) => self.terminal(terminal, children),
                Element::Rule(index) => children.push(self.rule(*index)?),
                Element::Operand { rule, precedence } => children.push(self.rule_at(*rule, *precedence)?),
                Element::Block(block) => self.block(block, children)?,
                Element::Repeat(repeat) => self.repeat(repeat, children)?,
            }
        }
        Ok(())
    }

    fn repeat(&mut self, repeat: &'a Repeat, children: &mut Vec<ParseNode>) -> Result<(), HeadlightsError> {
        match repeat.kind {
            RepeatKind::Optional => {
                if self.enters(repeat) {
                    self.block(&repeat.body, children)?;
                }
            }
            RepeatKind::ZeroOrMore => self.iterate(repeat, children)?,
            RepeatKind::OneOrMore => {
                self.block(&repeat.body, children)?;
                self.iterate(repeat, children)?;
            }
        }
        Ok(())
    }

    /// Whether the loop body should run (again) at the current token.
    fn enters(&self, repeat: &Repeat) -> bool {
        let la = self.la();
        repeat.body.lookahead.accepts(la) && (repeat.greedy || !repeat.exit.accepts(la))
    }

    fn iterate(&mut self, repeat: &'a Repeat, children: &mut Vec<ParseNode>) -> Result<(), HeadlightsError> {
        while self.enters(repeat) {
            if self.cancel.is_cancelled() {
                return Err(HeadlightsError::unpositioned(ErrorKind::Cancelled));
            }
            let before = self.index;
            self.block(&repeat.body, children)?;
            if self.index == before {
                break;
            }
        }
        Ok(())
    }

    // ========================================================================
    // TERMINALS AND RECOVERY
    // ========================================================================

    fn terminal(&mut self, terminal: &TokenMatch, children: &mut Vec<ParseNode>) {
        if terminal.matches(self.la()) {
            children.push(self.consume());
            return;
        }

        let expected = self.expected(terminal);
        let found = self.current().error_display();

        if self.current().is_eof() {
            self.report_at_current(ErrorKind::MissingToken {
                expected: expected.clone(),
                found,
            });
            children.push(ParseNode::Error(ErrorNode {
                text: format!("<missing {expected}>"),
                span: Span::empty(self.current().start),
            }));
            return;
        }

        if terminal.matches(self.lookahead(1)) {
            self.report_at_current(ErrorKind::ExtraneousInput { found, expected });
            children.push(self.consume_as_error());
            children.push(self.consume());
            return;
        }

        self.report_at_current(ErrorKind::MismatchedInput { found, expected });
        children.push(self.consume_as_error());
    }

    fn expected(&self, terminal: &TokenMatch) -> String {
        let vocabulary = self.model.vocabulary();
        match terminal {
            TokenMatch::Type(token_type) => vocabulary.display_name(*token_type).to_string(),
            other => vocabulary.describe(&other.first(vocabulary)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar;
    use crate::runtime::lexer::Lexer;

    fn parse(grammar_text: &str, input: &str) -> (String, Vec<HeadlightsError>) {
        parse_with_depth(grammar_text, input, 1000).unwrap()
    }

    fn parse_with_depth(
        grammar_text: &str,
        input: &str,
        max_depth: usize,
    ) -> Result<(String, Vec<HeadlightsError>), HeadlightsError> {
        let model = grammar::compile(grammar_text).expect("grammar compiles");
        let source = SourceText::new(input);
        let cancel = CancellationToken::new();
        let lexed = Lexer::new(&model, &source, &cancel).tokenize()?;
        let parser = Parser::new(&model, &source, &lexed.tokens, &cancel, max_depth);
        let (tree, errors) = parser.parse(0)?;
        Ok((tree.to_lisp(model.rule_names()), errors))
    }

    const EXPR: &str = "
        expr : term (('+' | '-') term)* ;
        term : INT | '(' expr ')' ;
        INT : [0-9]+ ;
        WS : [ \\t\\r\\n]+ -> skip ;
    ";

    #[test]
    fn nested_rules_and_loops() {
        let (tree, errors) = parse(EXPR, "1 + (2 - 3)");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(tree, "(expr (term 1) + (term ( (expr (term 2) - (term 3)) )))");
    }

    #[test]
    fn missing_token_at_end_of_input() {
        let (tree, errors) = parse("s : A B ; A : 'a' ; B : 'b' ;", "a");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind.to_string(), "missing B at '<EOF>'");
        assert_eq!(errors[0].span, Some(Span::empty(1)));
        assert_eq!(tree, "(s a <missing B>)");
    }

    #[test]
    fn extraneous_token_is_skipped() {
        let (tree, errors) = parse("s : A B ; A : 'a' ; B : 'b' ; C : 'c' ;", "acb");
        assert_eq!(errors[0].kind.to_string(), "extraneous input 'c' expecting B");
        assert_eq!(tree, "(s a c b)");
    }

    #[test]
    fn mismatched_token_is_replaced() {
        let (tree, errors) = parse("s : A B C ; A : 'a' ; B : 'b' ; C : 'c' ;", "aac");
        assert_eq!(errors[0].kind.to_string(), "mismatched input 'a' expecting B");
        assert_eq!(tree, "(s a a c)");
    }

    #[test]
    fn no_viable_alternative_consumes_the_token() {
        let (_, errors) = parse("s : A | B ; A : 'a' ; B : 'b' ; C : 'c' ;", "c");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind.to_string(), "no viable alternative at input 'c'");
    }

    #[test]
    fn trailing_tokens_need_explicit_eof() {
        let (_, errors) = parse("s : A ; A : 'a' ;", "aa");
        assert!(errors.is_empty());
        let (_, errors) = parse("s : A EOF ; A : 'a' ;", "aa");
        assert_eq!(errors[0].kind.to_string(), "extraneous input 'a' expecting EOF");
    }

    #[test]
    fn non_greedy_loop_stops_at_what_follows() {
        let (tree, errors) = parse("s : .*? ';' ; A : 'a' ; SEMI : ';' ;", "aa;");
        assert!(errors.is_empty());
        assert_eq!(tree, "(s a a ;)");
    }

    #[test]
    fn prefix_operators_bind_by_their_position() {
        let grammar = "e : '-' e | e '*' e | e '+' e | INT ; INT : [0-9]+ ;";
        let (tree, errors) = parse(grammar, "-1+2*3");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(tree, "(e (e - (e 1)) + (e (e 2) * (e 3)))");
    }

    #[test]
    fn operator_loop_stops_at_unknown_tokens() {
        let grammar = "s : e ';' ; e : e '+' e | INT ; INT : [0-9]+ ;";
        let (tree, errors) = parse(grammar, "1+2;");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(tree, "(s (e (e 1) + (e 2)) ;)");
    }

    #[test]
    fn recursion_limit_is_fatal() {
        let error = parse_with_depth("s : '(' s ')' | 'x' ;", "((((x))))", 3).unwrap_err();
        assert_eq!(error.kind, ErrorKind::RecursionLimit { limit: 3 });
    }
}
