//! Lexical analysis.
//!
//! Maximal munch over the token rules of the current mode. On equal lengths
//! the rule declared first wins. Characters no rule matches are reported one
//! at a time and skipped.

use log::trace;

use crate::engine::CancellationToken;
use crate::errors::{ErrorKind, ErrorReporting, HeadlightsError};
use crate::grammar::{GrammarModel, ModeChange, TokenRule};
use crate::runtime::token::{escape_whitespace, LexerToken};
use crate::source::{SourceText, Span};

/// Output of a lexer pass: every token on every channel, and the
/// recognition errors met on the way.
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<LexerToken>,
    pub errors: Vec<HeadlightsError>,
}

pub struct Lexer<'a> {
    model: &'a GrammarModel,
    source: &'a SourceText<'a>,
    cancel: &'a CancellationToken,
    position: usize,
    mode: usize,
    mode_stack: Vec<usize>,
    /// Start of the token being extended by `more`.
    pending: Option<usize>,
}

impl ErrorReporting for Lexer<'_> {
    fn source_text(&self) -> &SourceText<'_> {
        self.source
    }
}

impl<'a> Lexer<'a> {
    pub fn new(model: &'a GrammarModel, source: &'a SourceText<'a>, cancel: &'a CancellationToken) -> Self {
        Self {
            model,
            source,
            cancel,
            position: 0,
            mode: 0,
            mode_stack: Vec::new(),
            pending: None,
        }
    }

    /// Tokenizes the whole input. The end-of-input token is not included.
    pub fn tokenize(mut self) -> Result<Lexed, HeadlightsError> {
        let input = self.source.content();
        let mut lexed = Lexed::default();

        while self.position < input.len() {
            if self.cancel.is_cancelled() {
                return Err(HeadlightsError::unpositioned(ErrorKind::Cancelled));
            }

            let Some((end, rule)) = self.longest_match(input) else {
                let start = self.pending.take().unwrap_or(self.position);
                let next = self.source.next_char_boundary(self.position);
                let error = self.report(
                    ErrorKind::TokenRecognition {
                        text: escape_whitespace(&input[start..next]),
                    },
                    Span::new(start, next),
                );
                lexed.errors.push(error);
                self.position = next;
                continue;
            };

            let action = &rule.action;
            for change in &action.mode_changes {
                if let Err(error) = self.change_mode(*change, Span::new(self.position, end)) {
                    lexed.errors.push(error);
                }
            }

            if action.more {
                self.pending.get_or_insert(self.position);
                self.position = end;
                continue;
            }
            let start = self.pending.take().unwrap_or(self.position);
            self.position = end;
            if action.skip {
                continue;
            }

            let token_type = action.retype.unwrap_or(rule.token_type);
            let position = self.source.position(start);
            let token = LexerToken {
                type_name: self.model.vocabulary().display_name(token_type).to_string(),
                token_type,
                text: input[start..end].to_string(),
                start,
                end,
                line: position.line,
                column: position.column,
                channel: action.channel,
            };
            trace!("token {} {:?} at {}", token.type_name, token.text, position);
            lexed.tokens.push(token);
        }
        Ok(lexed)
    }

    fn longest_match(&self, input: &str) -> Option<(usize, &'a TokenRule)> {
        let mode = self.model.modes().get(self.mode)?;
        let mut best: Option<(usize, &'a TokenRule)> = None;
        for rule in &mode.rules {
            let Some(end) = rule.pattern.match_at(input, self.position) else {
                continue;
            };
            if end > self.position && best.map_or(true, |(longest, _)| end > longest) {
                best = Some((end, rule));
            }
        }
        best
    }

    fn change_mode(&mut self, change: ModeChange, span: Span) -> Result<(), HeadlightsError> {
        match change {
            ModeChange::Set(mode) => self.mode = mode,
            ModeChange::Push(mode) => {
                self.mode_stack.push(self.mode);
                self.mode = mode;
            }
            ModeChange::Pop => match self.mode_stack.pop() {
                Some(mode) => self.mode = mode,
                None => {
                    let text = escape_whitespace(&self.source.content()[span.start..span.end]);
                    return Err(self.report(ErrorKind::EmptyModeStack { text }, span));
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar;

    fn lex(grammar_text: &str, input: &str) -> Lexed {
        let model = grammar::compile(grammar_text).expect("grammar compiles");
        let source = SourceText::new(input);
        let cancel = CancellationToken::new();
        Lexer::new(&model, &source, &cancel).tokenize().unwrap()
    }

    fn pairs(lexed: &Lexed) -> Vec<(&str, &str)> {
        lexed
            .tokens
            .iter()
            .map(|t| (t.type_name.as_str(), t.text.as_str()))
            .collect()
    }

    #[test]
    fn first_declared_rule_wins_ties() {
        let lexed = lex("IF : 'if' ; ID : [a-z]+ ; WS : ' ' -> skip ;", "if iffy");
        assert_eq!(pairs(&lexed), vec![("IF", "if"), ("ID", "iffy")]);
    }

    #[test]
    fn more_extends_the_next_token() {
        let lexed = lex("Q : '\"' -> more, pushMode(S) ; mode S; STR : '\"' -> popMode ; C : . -> more ;", "\"ab\"");
        assert_eq!(pairs(&lexed), vec![("STR", "\"ab\"")]);
        assert!(lexed.errors.is_empty());
    }

    #[test]
    fn hidden_channel_tokens_are_kept() {
        let lexed = lex("A : 'a' ; WS : ' ' -> channel(HIDDEN) ;", "a a");
        assert_eq!(lexed.tokens.len(), 3);
        assert_eq!(lexed.tokens[1].channel, 1);
    }

    #[test]
    fn pop_on_empty_stack_is_reported() {
        let lexed = lex("A : 'a' -> popMode ;", "aa");
        assert_eq!(lexed.tokens.len(), 2);
        assert_eq!(lexed.errors.len(), 2);
        assert!(matches!(lexed.errors[0].kind, ErrorKind::EmptyModeStack { .. }));
    }

    #[test]
    fn unmatched_multibyte_character_is_skipped_whole() {
        let lexed = lex("A : 'a' ;", "aéa");
        assert_eq!(pairs(&lexed), vec![("A", "a"), ("A", "a")]);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].span, Some(Span::new(1, 3)));
    }

    #[test]
    fn cancellation_stops_the_pass() {
        let model = grammar::compile("A : 'a' ;").unwrap();
        let source = SourceText::new("aaa");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = Lexer::new(&model, &source, &cancel).tokenize().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cancelled);
    }
}
