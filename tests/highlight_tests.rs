mod common;

use headlights::{highlight, HighlightClass, HighlightSpan, HighlightedDocument};

use common::load_fixtures;

fn classified<'a>(text: &'a str) -> Vec<(&'a str, HighlightClass)> {
    highlight(text).map(|span| (&text[span.start..span.end], span.class)).collect()
}

#[test]
fn empty_text() {
    assert_eq!(highlight("").next(), None);
}

#[test]
fn comment_covers_exactly_the_comment() {
    assert_eq!(
        highlight("// hi").collect::<Vec<_>>(),
        vec![HighlightSpan {
            start: 0,
            end: 5,
            class: HighlightClass::Comment
        }]
    );
    assert_eq!(classified("A : 'a' ; // tail")[4], ("// tail", HighlightClass::Comment));
}

#[test]
fn spans_are_ordered_and_disjoint() {
    for fixture in load_fixtures() {
        let spans: Vec<HighlightSpan> = highlight(&fixture.grammar).collect();
        assert!(!spans.is_empty());
        for pair in spans.windows(2) {
            assert!(pair[0].end <= pair[1].start, "{}: {:?}", fixture.name, pair);
        }
        assert!(spans.iter().all(|span| span.start < span.end && span.end <= fixture.grammar.len()));
    }
}

#[test]
fn grammar_header_and_rules() {
    use HighlightClass::*;
    let spans = classified("lexer grammar L;\nfragment D : [0-9] ;");
    assert_eq!(
        spans,
        vec![
            ("lexer", Keyword),
            ("grammar", Keyword),
            ("L", LexerRule),
            (";", Delimiter),
            ("fragment", Keyword),
            ("D", LexerRule),
            (":", Delimiter),
            ("[0-9]", CharSet),
            (";", Delimiter),
        ]
    );
}

#[test]
fn actions_are_single_spans() {
    let spans = classified("s : A {print(\"}\");} B ;");
    assert!(spans.contains(&("{print(\"}\");}", HighlightClass::Action)));
    assert!(spans.contains(&("B", HighlightClass::LexerRule)));
}

#[test]
fn highlighting_does_not_need_a_valid_grammar() {
    let spans = classified("s : : 'unterminated");
    assert_eq!(spans.last(), Some(&("'unterminated", HighlightClass::Literal)));
}

#[test]
fn document_tracks_edits() {
    let text = "s : A ;\nA : 'a' ;\nB : 'b' ;";
    let mut document = HighlightedDocument::new(text);
    assert_eq!(document.spans(), highlight(text).collect::<Vec<_>>());

    assert_eq!(document.replace_line(0, "s : A B ;"), 1);
    assert_eq!(document.replace_line(1, "/*"), 2);
    assert!(document
        .line_spans(2)
        .unwrap()
        .iter()
        .all(|span| span.class == HighlightClass::Comment));
    assert_eq!(document.spans(), highlight(&document.text()).collect::<Vec<_>>());
}

#[test]
fn crlf_comment_ends_before_the_carriage_return() {
    let text = "A : 'a' ; // c\r\nB : 'b' ;\r\n";
    let spans = classified(text);
    assert_eq!(spans[4], ("// c", HighlightClass::Comment));
    assert_eq!(spans[5], ("B", HighlightClass::LexerRule));
    let comment = highlight(text).nth(4).unwrap();
    assert_eq!((comment.start, comment.end), (10, 14));
}
