//! Parse trees.

use std::fmt::Write;

use serde::Serialize;

use crate::runtime::token::{escape_whitespace, LexerToken};
use crate::source::Span;

/// A node of the parse tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum ParseNode {
    /// An invocation of the parser rule with this index.
    Rule {
        rule_index: usize,
        children: Vec<ParseNode>,
    },
    /// A matched token.
    Token(LexerToken),
    /// Input consumed or synthesized during error recovery.
    Error(ErrorNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNode {
    pub text: String,
    /// The consumed token, or an empty span where a missing token was assumed.
    pub span: Span,
}

impl ParseNode {
    pub fn rule_index(&self) -> Option<usize> {
        match self {
            ParseNode::Rule { rule_index, .. } => Some(*rule_index),
            ParseNode::Token(_) | ParseNode::Error(_) => None,
        }
    }

    pub fn children(&self) -> &[ParseNode] {
        match self {
            ParseNode::Rule { children, .. } => children,
            ParseNode::Token(_) | ParseNode::Error(_) => &[],
        }
    }

    /// Source range covered by this node; `None` for rules that matched nothing.
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseNode::Token(token) => Some(token.span()),
            ParseNode::Error(error) => Some(error.span),
            ParseNode::Rule { children, .. } => {
                let first = children.iter().find_map(ParseNode::span)?;
                let last = children.iter().rev().find_map(ParseNode::span)?;
                Some(Span::new(first.start, last.end))
            }
        }
    }

    /// Matched tokens in tree order, skipping error nodes.
    pub fn leaf_tokens(&self) -> Vec<&LexerToken> {
        let mut tokens = Vec::new();
        self.collect_tokens(&mut tokens);
        tokens
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a LexerToken>) {
        match self {
            ParseNode::Token(token) => out.push(token),
            ParseNode::Error(_) => {}
            ParseNode::Rule { children, .. } => {
                for child in children {
                    child.collect_tokens(out);
                }
            }
        }
    }

    /// Error nodes anywhere below (and including) this node.
    pub fn error_nodes(&self) -> Vec<&ErrorNode> {
        match self {
            ParseNode::Error(error) => vec![error],
            ParseNode::Token(_) => Vec::new(),
            ParseNode::Rule { children, .. } => children.iter().flat_map(ParseNode::error_nodes).collect(),
        }
    }

    /// Text label of this node: the rule name, token text or error text.
    pub fn label(&self, rule_names: &[String]) -> String {
        match self {
            ParseNode::Rule { rule_index, .. } => rule_names
                .get(*rule_index)
                .cloned()
                .unwrap_or_else(|| format!("<rule {rule_index}>")),
            ParseNode::Token(token) if token.is_eof() => "<EOF>".to_string(),
            ParseNode::Token(token) => escape_whitespace(&token.text),
            ParseNode::Error(error) => escape_whitespace(&error.text),
        }
    }

    /// LISP-style rendering, e.g. `(expr (term 1) + (term 2))`.
    pub fn to_lisp(&self, rule_names: &[String]) -> String {
        let mut out = String::new();
        self.write_lisp(rule_names, &mut out);
        out
    }

    fn write_lisp(&self, rule_names: &[String], out: &mut String) {
        let children = self.children();
        if children.is_empty() {
            out.push_str(&self.label(rule_names));
            return;
        }
        out.push('(');
        out.push_str(&self.label(rule_names));
        for child in children {
            out.push(' ');
            child.write_lisp(rule_names, out);
        }
        out.push(')');
    }

    /// One node per line, indented by depth.
    pub fn outline(&self, rule_names: &[String]) -> String {
        let mut out = String::new();
        self.write_outline(rule_names, 0, &mut out);
        out
    }

    fn write_outline(&self, rule_names: &[String], depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let _ = match self {
            ParseNode::Rule { .. } => writeln!(out, "{indent}{}", self.label(rule_names)),
            ParseNode::Token(token) => {
                writeln!(out, "{indent}{} {}", token.type_name, token.error_display())
            }
            ParseNode::Error(_) => writeln!(out, "{indent}<error> {}", self.label(rule_names)),
        };
        for child in self.children() {
            child.write_outline(rule_names, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, start: usize) -> ParseNode {
        ParseNode::Token(LexerToken {
            type_name: "T".into(),
            token_type: 1,
            text: text.into(),
            start,
            end: start + text.len(),
            line: 1,
            column: start + 1,
            channel: 0,
        })
    }

    fn sample() -> (ParseNode, Vec<String>) {
        let tree = ParseNode::Rule {
            rule_index: 0,
            children: vec![
                token("a", 0),
                ParseNode::Rule {
                    rule_index: 1,
                    children: vec![token("b", 2)],
                },
                ParseNode::Error(ErrorNode {
                    text: "<missing C>".into(),
                    span: Span::empty(3),
                }),
            ],
        };
        (tree, vec!["s".into(), "t".into()])
    }

    #[test]
    fn lisp_rendering() {
        let (tree, names) = sample();
        assert_eq!(tree.to_lisp(&names), "(s a (t b) <missing C>)");
    }

    #[test]
    fn spans_and_leaves() {
        let (tree, _) = sample();
        assert_eq!(tree.span(), Some(Span::new(0, 3)));
        let texts: Vec<&str> = tree.leaf_tokens().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["a", "b"]);
        assert_eq!(tree.error_nodes().len(), 1);
    }

    #[test]
    fn outline_indents_children() {
        let (tree, names) = sample();
        assert_eq!(tree.outline(&names), "s\n  T 'a'\n  t\n    T 'b'\n  <error> <missing C>\n");
    }
}
