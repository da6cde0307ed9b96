use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::HighlightClass;

/// The fixed pattern table. Alternatives are tried left to right at each
/// position, so keywords shadow rule names.
pub(super) static TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?P<line_comment>//[^\r\n]*)",
        r"|(?P<block_comment>/\*)",
        r"|(?P<literal>'(?:[^'\\]|\\.)*'?)",
        r"|(?P<char_set>\[(?:[^\]\\]|\\.)*\]?)",
        r"|(?P<action>\{)",
        r"|(?P<keyword>\b(?:grammar|lexer|parser|fragment|options|tokens|channels|import|mode|returns|locals|throws|catch|finally)\b)",
        r"|(?P<command>\b(?:skip|more|type|channel|pushMode|popMode)\b)",
        r"|(?P<lexer_rule>\b[A-Z]\w*)",
        r"|(?P<parser_rule>\b[a-z_]\w*)",
        r"|(?P<operator>->|\.\.|\+=|[|*+?~#=.!])",
        r"|(?P<delimiter>[;:(),<>@])",
    ))
    .expect("highlight pattern table is valid")
});

/// What a table match means for the scanner.
pub(super) enum Token {
    /// A complete span.
    Span(HighlightClass),
    /// `/*`: the scanner switches to comment mode.
    OpenComment,
    /// `{`: the scanner switches to action mode.
    OpenAction,
}

const GROUPS: [(&str, HighlightClass); 9] = [
    ("line_comment", HighlightClass::Comment),
    ("literal", HighlightClass::Literal),
    ("char_set", HighlightClass::CharSet),
    ("keyword", HighlightClass::Keyword),
    ("command", HighlightClass::Command),
    ("lexer_rule", HighlightClass::LexerRule),
    ("parser_rule", HighlightClass::ParserRule),
    ("operator", HighlightClass::Operator),
    ("delimiter", HighlightClass::Delimiter),
];

pub(super) fn classify(captures: &Captures<'_>) -> Option<Token> {
    if captures.name("block_comment").is_some() {
        return Some(Token::OpenComment);
    }
    if captures.name("action").is_some() {
        return Some(Token::OpenAction);
    }
    GROUPS
        .iter()
        .find(|(group, _)| captures.name(group).is_some())
        .map(|&(_, class)| Token::Span(class))
}
