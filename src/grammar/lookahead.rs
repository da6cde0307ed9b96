//! One-token lookahead analysis over parser rules.
//!
//! FIRST sets and nullability are computed to a fixpoint across all rules,
//! then written into every block and alternative so the parser can predict
//! without recomputing anything.

use std::collections::BTreeSet;

use crate::grammar::model::{Block, Element, Lookahead, ParserRule, RepeatKind, Vocabulary};

/// Lookahead of every parser rule, indexed by rule index.
pub(crate) struct LookaheadTable<'a> {
    rules: Vec<Lookahead>,
    vocabulary: &'a Vocabulary,
}

impl<'a> LookaheadTable<'a> {
    /// Runs the fixpoint over the given rules.
    pub fn compute(rules: &[ParserRule], vocabulary: &'a Vocabulary) -> Self {
        let mut table = Self {
            rules: vec![Lookahead::default(); rules.len()],
            vocabulary,
        };
        loop {
            let mut changed = false;
            for (index, rule) in rules.iter().enumerate() {
                let lookahead = table.rule_body(rule);
                if lookahead != table.rules[index] {
                    table.rules[index] = lookahead;
                    changed = true;
                }
            }
            if !changed {
                return table;
            }
        }
    }

    pub fn rule(&self, index: usize) -> &Lookahead {
        &self.rules[index]
    }

    /// Operators only start a rule when its primary alternatives can be empty.
    fn rule_body(&self, rule: &ParserRule) -> Lookahead {
        let mut lookahead = self.block(&rule.block);
        if let (true, Some(operators)) = (lookahead.nullable, &rule.operators) {
            lookahead.first.extend(self.block(&operators.block).first);
        }
        lookahead
    }

    /// Writes lookahead sets into every block, alternative and loop of `rules`.
    pub fn annotate(&self, rules: &mut [ParserRule]) {
        for rule in rules {
            self.annotate_block(&mut rule.block);
            if let Some(operators) = &mut rule.operators {
                self.annotate_block(&mut operators.block);
            }
        }
    }

    fn annotate_block(&self, block: &mut Block) {
        for alternative in &mut block.alternatives {
            for index in 0..alternative.elements.len() {
                let rest = self.sequence(&alternative.elements[index + 1..]);
                match &mut alternative.elements[index] {
                    Element::Block(inner) => self.annotate_block(inner),
                    Element::Repeat(repeat) => {
                        self.annotate_block(&mut repeat.body);
                        repeat.exit = rest;
                    }
                    Element::Terminal(_) | Element::Rule(_) | Element::Operand { .. } => {}
                }
            }
            alternative.lookahead = self.sequence(&alternative.elements);
        }
        block.lookahead = self.block(block);
    }

    pub fn block(&self, block: &Block) -> Lookahead {
        let mut result = Lookahead::default();
        for alternative in &block.alternatives {
            let lookahead = self.sequence(&alternative.elements);
            result.first.extend(lookahead.first);
            result.nullable |= lookahead.nullable;
        }
        if block.alternatives.is_empty() {
            result.nullable = true;
        }
        result
    }

    pub fn sequence(&self, elements: &[Element]) -> Lookahead {
        let mut first = BTreeSet::new();
        for element in elements {
            let lookahead = self.element(element);
            first.extend(lookahead.first);
            if !lookahead.nullable {
                return Lookahead {
                    first,
                    nullable: false,
                };
            }
        }
        Lookahead {
            first,
            nullable: true,
        }
    }

    pub fn element(&self, element: &Element) -> Lookahead {
        match element {
            Element::Terminal(terminal) => Lookahead {
                first: terminal.first(self.vocabulary),
                nullable: false,
            },
            Element::Rule(index) | Element::Operand { rule: index, .. } => self.rules[*index].clone(),
            Element::Block(block) => self.block(block),
            Element::Repeat(repeat) => {
                let body = self.block(&repeat.body);
                Lookahead {
                    nullable: body.nullable || repeat.kind != RepeatKind::OneOrMore,
                    first: body.first,
                }
            }
        }
    }
}

// ============================================================================
// LEFT RECURSION
// ============================================================================

/// Finds rule cycles that can be entered without consuming a token.
///
/// Each cycle is returned once, as the path of rule indices starting and
/// ending at the same rule.
pub(crate) fn left_recursion(rules: &[ParserRule], table: &LookaheadTable<'_>) -> Vec<Vec<usize>> {
    let edges: Vec<BTreeSet<usize>> = rules
        .iter()
        .map(|rule| {
            let mut calls = BTreeSet::new();
            left_calls(&rule.block, table, &mut calls);
            calls
        })
        .collect();

    let mut cycles = Vec::new();
    let mut seen: BTreeSet<BTreeSet<usize>> = BTreeSet::new();
    let mut state = vec![Visit::New; rules.len()];
    let mut path = Vec::new();
    for start in 0..rules.len() {
        visit(start, &edges, &mut state, &mut path, &mut |cycle| {
            let members: BTreeSet<usize> = cycle.iter().copied().collect();
            if seen.insert(members) {
                cycles.push(cycle);
            }
        });
    }
    cycles
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

fn visit(
    node: usize,
    edges: &[BTreeSet<usize>],
    state: &mut [Visit],
    path: &mut Vec<usize>,
    found: &mut dyn FnMut(Vec<usize>),
) {
    match state[node] {
        Visit::Done => return,
        Visit::Active => {
            if let Some(start) = path.iter().position(|&n| n == node) {
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                found(cycle);
            }
            return;
        }
        Visit::New => {}
    }
    state[node] = Visit::Active;
    path.push(node);
    for &next in &edges[node] {
        visit(next, edges, state, path, found);
    }
    path.pop();
    state[node] = Visit::Done;
}

/// Rules that can be invoked from `block` before any token is consumed.
fn left_calls(block: &Block, table: &LookaheadTable<'_>, calls: &mut BTreeSet<usize>) {
    for alternative in &block.alternatives {
        for element in &alternative.elements {
            match element {
                Element::Rule(index) | Element::Operand { rule: index, .. } => {
                    calls.insert(*index);
                }
                Element::Block(inner) => left_calls(inner, table, calls),
                Element::Repeat(repeat) => left_calls(&repeat.body, table, calls),
                Element::Terminal(_) => {}
            }
            if !table.element(element).nullable {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::model::{Alternative, Repeat, TokenMatch, TokenType};

    fn alt(elements: Vec<Element>) -> Alternative {
        Alternative {
            elements,
            ..Alternative::default()
        }
    }

    fn rule(index: usize, alternatives: Vec<Alternative>) -> ParserRule {
        ParserRule {
            name: format!("r{index}"),
            index,
            block: Block {
                alternatives,
                ..Block::default()
            },
            operators: None,
            span: Default::default(),
        }
    }

    fn vocabulary() -> Vocabulary {
        let mut vocabulary = Vocabulary::new();
        vocabulary.add("A");
        vocabulary.add("B");
        vocabulary
    }

    fn token(t: TokenType) -> Element {
        Element::Terminal(TokenMatch::Type(t))
    }

    #[test]
    fn first_sets_flow_through_nullable_rules() {
        let vocabulary = vocabulary();
        // r0 : r1 B ;  r1 : A | ;
        let mut rules = vec![
            rule(0, vec![alt(vec![Element::Rule(1), token(2)])]),
            rule(1, vec![alt(vec![token(1)]), alt(vec![])]),
        ];
        let table = LookaheadTable::compute(&rules, &vocabulary);
        assert_eq!(table.rule(0).first, BTreeSet::from([1, 2]));
        assert!(!table.rule(0).nullable);
        assert!(table.rule(1).nullable);

        table.annotate(&mut rules);
        assert_eq!(rules[1].block.predict(1), Some(0));
        assert_eq!(rules[1].block.predict(2), Some(1));
    }

    #[test]
    fn loops_record_their_exit_tokens() {
        let vocabulary = vocabulary();
        let body = Block {
            alternatives: vec![alt(vec![Element::Terminal(TokenMatch::Any)])],
            ..Block::default()
        };
        let repeat = Element::Repeat(Repeat {
            body,
            kind: RepeatKind::ZeroOrMore,
            greedy: false,
            exit: Lookahead::default(),
        });
        let mut rules = vec![rule(0, vec![alt(vec![repeat, token(2)])])];
        let table = LookaheadTable::compute(&rules, &vocabulary);
        table.annotate(&mut rules);
        match &rules[0].block.alternatives[0].elements[0] {
            Element::Repeat(repeat) => assert_eq!(repeat.exit.first, BTreeSet::from([2])),
            other => panic!("expected a loop, got {other:?}"),
        }
    }

    #[test]
    fn indirect_left_recursion_through_nullable_prefix() {
        let vocabulary = vocabulary();
        // r0 : r1? r2 ;  r1 : A ;  r2 : r0 B ;
        let optional = Element::Repeat(Repeat {
            body: Block {
                alternatives: vec![alt(vec![Element::Rule(1)])],
                ..Block::default()
            },
            kind: RepeatKind::Optional,
            greedy: true,
            exit: Lookahead::default(),
        });
        let rules = vec![
            rule(0, vec![alt(vec![optional, Element::Rule(2)])]),
            rule(1, vec![alt(vec![token(1)])]),
            rule(2, vec![alt(vec![Element::Rule(0), token(2)])]),
        ];
        let table = LookaheadTable::compute(&rules, &vocabulary);
        let cycles = left_recursion(&rules, &table);
        assert_eq!(cycles, vec![vec![0, 2, 0]]);
    }

    #[test]
    fn right_recursion_is_fine() {
        let vocabulary = vocabulary();
        // r0 : A r0 | B ;
        let rules = vec![rule(
            0,
            vec![alt(vec![token(1), Element::Rule(0)]), alt(vec![token(2)])],
        )];
        let table = LookaheadTable::compute(&rules, &vocabulary);
        assert!(left_recursion(&rules, &table).is_empty());
    }
}
