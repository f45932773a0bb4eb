//! Compiled pattern representation.

use regex::Regex;

use crate::tree::SyntaxNode;

#[derive(Debug, Clone)]
pub(crate) enum NodeMatcher {
    /// `(kind)`: a named node of that kind.
    Kind(String),
    /// `(_)`: any named node.
    AnyNamed,
    /// `_`: any node, named or anonymous.
    Any,
    /// `"text"`: an anonymous node of that kind.
    Literal(String),
    /// `[a b ...]`: the first alternative that matches.
    Alternation(Vec<PatternNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quantifier {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

/// A capture attached to a pattern node. `seq` is the declaration order of
/// the `@name` within the whole query and orders captures in a match.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CapturePoint {
    pub(crate) seq: usize,
    pub(crate) index: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct PatternNode {
    pub(crate) matcher: NodeMatcher,
    pub(crate) field: Option<String>,
    pub(crate) negated_fields: Vec<String>,
    pub(crate) children: Vec<PatternNode>,
    pub(crate) quantifier: Quantifier,
    pub(crate) captures: Vec<CapturePoint>,
}

impl PatternNode {
    pub(crate) fn new(matcher: NodeMatcher) -> Self {
        Self {
            matcher,
            field: None,
            negated_fields: Vec::new(),
            children: Vec::new(),
            quantifier: Quantifier::One,
            captures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Capture(usize),
    Literal(String),
}

#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Eq {
        capture: usize,
        operand: Operand,
        negate: bool,
    },
    Match {
        capture: usize,
        regex: Regex,
        negate: bool,
    },
    AnyOf {
        capture: usize,
        values: Vec<String>,
        negate: bool,
    },
}

/// A node bound to a capture during matching.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Binding<'t> {
    pub(crate) seq: usize,
    pub(crate) capture: usize,
    pub(crate) node: SyntaxNode<'t>,
}

fn bound_texts<'a, 't: 'a>(
    binds: &'a [Binding<'t>],
    capture: usize,
) -> impl Iterator<Item = &'t str> + 'a {
    binds
        .iter()
        .filter(move |b| b.capture == capture)
        .map(|b| b.node.text())
}

impl Predicate {
    /// Whether the predicate holds for the bindings of one structural match.
    /// A capture with no bound node (an unmatched optional) satisfies every
    /// predicate.
    pub(crate) fn holds(&self, binds: &[Binding<'_>]) -> bool {
        match self {
            Predicate::Eq {
                capture,
                operand: Operand::Literal(value),
                negate,
            } => bound_texts(binds, *capture).all(|text| (text == value) != *negate),
            Predicate::Eq {
                capture,
                operand: Operand::Capture(other),
                negate,
            } => {
                let left = bound_texts(binds, *capture).next();
                let right = bound_texts(binds, *other).next();
                match (left, right) {
                    (Some(left), Some(right)) => (left == right) != *negate,
                    _ => true,
                }
            }
            Predicate::Match {
                capture,
                regex,
                negate,
            } => bound_texts(binds, *capture).all(|text| regex.is_match(text) != *negate),
            Predicate::AnyOf {
                capture,
                values,
                negate,
            } => bound_texts(binds, *capture)
                .all(|text| values.iter().any(|v| v == text) != *negate),
        }
    }
}

/// One top-level pattern of a query.
#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    pub(crate) root: PatternNode,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) start_byte: usize,
}
