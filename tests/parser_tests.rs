mod common;

use headlights::{interpret, ErrorSource, Interpreter, InterpreterConfig, ParseNode};

use common::{assert_clean, fixture, lisp, messages};

#[test]
fn expression_fixture() {
    let expr = fixture("expr");
    let result = interpret(&expr.grammar, &expr.input);
    assert_clean(&result);
    assert_eq!(
        lisp(&result),
        "(prog (stat (expr (term (factor 1)) + (term (factor 2) * (factor x))) ;) \
         (stat (expr (term (factor ( (expr (term (factor y)) - (term (factor 3))) )) / (factor 4))) ;) <EOF>)"
    );
}

#[test]
fn tree_is_rooted_at_the_start_rule() {
    let json = fixture("json");
    let result = interpret(&json.grammar, &json.input);
    assert_clean(&result);
    let tree = result.tree().unwrap();
    assert_eq!(tree.label(result.rule_names()), "json");
    assert!(tree.error_nodes().is_empty());
}

#[test]
fn leaves_follow_the_token_stream() {
    let json = fixture("json");
    let result = interpret(&json.grammar, &json.input);
    let tree = result.tree().unwrap();
    let leaves: Vec<&str> = tree
        .leaf_tokens()
        .into_iter()
        .filter(|token| !token.is_eof())
        .map(|token| token.text.as_str())
        .collect();
    assert_eq!(leaves.first(), Some(&"{"));
    assert_eq!(leaves.last(), Some(&"}"));
    assert!(leaves.contains(&"\"a \\\"quoted\\\" word\""));
    assert!(leaves.contains(&"1.5"));
}

#[test]
fn missing_second_token() {
    let result = interpret("s : A B ; A : 'a' ; B : 'b' ;", "a");
    assert_eq!(result.errors().len(), 1);
    let error = &result.errors()[0];
    assert_eq!(error.source, ErrorSource::Text);
    assert_eq!((error.line, error.column), (1, 2));
    assert_eq!(error.message, "missing B at '<EOF>'");

    let tree = result.tree().unwrap();
    assert_eq!(tree.error_nodes().len(), 1);
    assert_eq!(lisp(&result), "(s a <missing B>)");
}

#[test]
fn lexer_and_parser_errors_are_merged_in_input_order() {
    let result = interpret("s : A B ; A : 'a' ; B : 'b' ;", "#a");
    assert_eq!(
        messages(&result),
        ["token recognition error at: '#'", "missing B at '<EOF>'"]
    );
    assert_eq!(result.focus().map(|focus| focus.position.column), Some(1));
}

#[test]
fn hidden_tokens_do_not_reach_the_parser() {
    let result = interpret("s : A A ; A : 'a' ; WS : ' ' -> channel(HIDDEN) ;", "a a");
    assert_clean(&result);
    assert_eq!(lisp(&result), "(s a a)");
}

#[test]
fn optional_and_repeated_elements() {
    let grammar = "list : '[' (ID (',' ID)*)? ']' ; ID : [a-z]+ ; WS : ' ' -> skip ;";
    assert_eq!(lisp(&interpret(grammar, "[]")), "(list [ ])");
    assert_eq!(lisp(&interpret(grammar, "[a, b, c]")), "(list [ a , b , c ])");
}

#[test]
fn alternatives_are_chosen_by_lookahead() {
    let grammar = "stat : ID '=' NUM | 'print' ID ; ID : [a-z]+ ; NUM : [0-9]+ ; WS : ' ' -> skip ;";
    assert_eq!(lisp(&interpret(grammar, "x = 1")), "(stat x = 1)");
    assert_eq!(lisp(&interpret(grammar, "print x")), "(stat print x)");
}

#[test]
fn configured_start_rule() {
    let interpreter = Interpreter::new(InterpreterConfig::default().with_start_rule("pair"));
    let result = interpreter.interpret("list : pair+ ; pair : A B ; A : 'a' ; B : 'b' ;", "ab");
    assert_clean(&result);
    assert_eq!(lisp(&result), "(pair a b)");
}

#[test]
fn wildcard_and_negated_tokens() {
    let grammar = "s : A ~B . ; A : 'a' ; B : 'b' ; C : 'c' ;";
    assert_clean(&interpret(grammar, "acb"));
    let result = interpret(grammar, "abc");
    assert_eq!(messages(&result)[0], "extraneous input 'b' expecting {A, C}");
}

#[test]
fn recovery_keeps_every_token_in_the_tree() {
    let result = interpret("s : A B C ; A : 'a' ; B : 'b' ; C : 'c' ;", "aac");
    assert_eq!(result.errors().len(), 1);
    let tree = result.tree().unwrap();
    let kinds: Vec<&str> = tree
        .children()
        .iter()
        .map(|child| match child {
            ParseNode::Token(_) => "token",
            ParseNode::Error(_) => "error",
            ParseNode::Rule { .. } => "rule",
        })
        .collect();
    assert_eq!(kinds, ["token", "error", "token"]);
}

#[test]
fn left_recursive_operators_follow_precedence() {
    let calc = fixture("calc");
    let result = interpret(&calc.grammar, &calc.input);
    assert_clean(&result);
    assert_eq!(
        lisp(&result),
        "(prog (expr (expr 1) + (expr (expr 2) * (expr 3))) \\n \
         (expr (expr 2) ^ (expr (expr 3) ^ (expr 2))) \\n \
         (expr (expr - (expr ( (expr (expr a) - (expr b)) ))) - (expr c)) \\n \
         (expr (expr (expr 4) !) !) \\n <EOF>)"
    );
}

#[test]
fn left_recursive_rule_from_a_single_alternative() {
    let grammar = "e : e '+' INT | INT ; INT : [0-9]+ ;";
    let result = interpret(grammar, "1+2+3");
    assert_clean(&result);
    assert_eq!(lisp(&result), "(e (e (e 1) + 2) + 3)");

    let result = interpret(grammar, "1+");
    assert_eq!(messages(&result), ["missing INT at '<EOF>'"]);
}
