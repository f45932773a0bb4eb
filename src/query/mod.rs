//! Structural pattern queries over syntax trees.
//!
//! A [`Query`] is compiled once against a [`Grammar`] and can then be run
//! against any number of trees produced by that grammar. Patterns use the
//! S-expression syntax common to tree-sitter style tooling:
//!
//! ```text
//! ; every class name
//! (class_declaration name: (identifier) @name)
//!
//! ; constants only
//! ((identifier) @id (#match? @id "^[A-Z_]+$"))
//! ```
//!
//! Execution visits candidate anchors in pre-order. At each anchor the
//! patterns are tried in declaration order and the first one that matches
//! (structure and predicates) produces a [`QueryMatch`].

mod matcher;
mod parser;
mod pattern;

use std::ops::Range;
use std::sync::Arc;

use crate::config::DEFAULT_MAX_PATTERN_DEPTH;
use crate::error::{AnalysisError, Result};
use crate::grammar::Grammar;
use crate::tree::{Point, SyntaxNode, Tree};

use pattern::{Binding, Pattern};

/// Execution bounds for [`Query::matches`] and [`Query::captures`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Only anchors intersecting this byte range are considered.
    pub byte_range: Option<Range<usize>>,
    /// Only anchors intersecting this point range are considered.
    pub point_range: Option<Range<Point>>,
    /// Stop after this many matches.
    pub match_limit: Option<usize>,
    /// Only anchors at most this many levels below the starting node.
    pub max_start_depth: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_byte_range(mut self, range: Range<usize>) -> Self {
        self.byte_range = Some(range);
        self
    }

    pub fn with_point_range(mut self, range: Range<Point>) -> Self {
        self.point_range = Some(range);
        self
    }

    pub fn with_match_limit(mut self, limit: usize) -> Self {
        self.match_limit = Some(limit);
        self
    }

    pub fn with_max_start_depth(mut self, depth: usize) -> Self {
        self.max_start_depth = Some(depth);
        self
    }

    fn relation(&self, node: &SyntaxNode<'_>) -> Relation {
        let bytes = self
            .byte_range
            .as_ref()
            .map(|r| relate(node.start_byte(), node.end_byte(), r));
        let points = self
            .point_range
            .as_ref()
            .map(|r| relate(node.start_position(), node.end_position(), r));
        match (bytes, points) {
            (Some(Relation::After), _) | (_, Some(Relation::After)) => Relation::After,
            (Some(Relation::Before), _) | (_, Some(Relation::Before)) => Relation::Before,
            _ => Relation::Inside,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    /// The node and its whole subtree end before the range.
    Before,
    Inside,
    /// The node and every later node in pre-order start after the range.
    After,
}

fn relate<T: Ord + Copy>(start: T, end: T, range: &Range<T>) -> Relation {
    if range.start == range.end {
        // An empty range selects nodes touching that position.
        if end < range.start {
            Relation::Before
        } else if start > range.start {
            Relation::After
        } else {
            Relation::Inside
        }
    } else if end < range.start || (end == range.start && start < end) {
        Relation::Before
    } else if start >= range.end {
        Relation::After
    } else {
        Relation::Inside
    }
}

/// A node bound to a capture name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCapture<'t> {
    pub name: Arc<str>,
    /// Index into [`Query::capture_names`].
    pub index: usize,
    pub node: SyntaxNode<'t>,
}

/// One successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch<'t> {
    pub pattern_index: usize,
    /// The node the pattern's root matched.
    pub anchor: SyntaxNode<'t>,
    /// Ordered by capture declaration order within the pattern.
    pub captures: Vec<QueryCapture<'t>>,
}

impl<'t> QueryMatch<'t> {
    /// First node captured under `name`.
    pub fn capture(&self, name: &str) -> Option<SyntaxNode<'t>> {
        self.nodes_for_capture(name).next()
    }

    pub fn nodes_for_capture<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = SyntaxNode<'t>> + 'a {
        self.captures
            .iter()
            .filter(move |c| &*c.name == name)
            .map(|c| c.node)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMatches<'t> {
    pub matches: Vec<QueryMatch<'t>>,
    /// Set when a further match existed beyond the match limit.
    pub limit_exceeded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCaptures<'t> {
    pub captures: Vec<QueryCapture<'t>>,
    pub limit_exceeded: bool,
}

/// A compiled, reusable query.
#[derive(Debug)]
pub struct Query {
    grammar: String,
    patterns: Vec<Pattern>,
    capture_names: Vec<Arc<str>>,
}

impl Query {
    /// Compile `source` with the default pattern depth bound.
    pub fn new(grammar: &Grammar, source: &str) -> Result<Self> {
        Self::with_max_depth(grammar, source, DEFAULT_MAX_PATTERN_DEPTH)
    }

    /// Compile `source`; patterns nested deeper than `max_pattern_depth`
    /// fail with `DepthExceeded`.
    pub fn with_max_depth(grammar: &Grammar, source: &str, max_pattern_depth: usize) -> Result<Self> {
        let compiled = parser::compile(grammar, source, max_pattern_depth)?;
        tracing::trace!(
            grammar = grammar.name(),
            patterns = compiled.patterns.len(),
            captures = compiled.capture_names.len(),
            "compiled query"
        );
        Ok(Self {
            grammar: grammar.name().to_string(),
            patterns: compiled.patterns,
            capture_names: compiled.capture_names,
        })
    }

    pub fn grammar_name(&self) -> &str {
        &self.grammar
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn capture_names(&self) -> &[Arc<str>] {
        &self.capture_names
    }

    pub fn capture_index_for_name(&self, name: &str) -> Option<usize> {
        self.capture_names.iter().position(|n| &**n == name)
    }

    /// Byte offset in the query source where pattern `index` begins.
    pub fn start_byte_for_pattern(&self, index: usize) -> Option<usize> {
        self.patterns.get(index).map(|p| p.start_byte)
    }

    fn check_grammar(&self, tree: &Tree) -> Result<()> {
        if tree.grammar_name() == self.grammar {
            return Ok(());
        }
        tracing::error!(
            query_grammar = %self.grammar,
            tree_grammar = tree.grammar_name(),
            "query run against a tree from another grammar"
        );
        Err(AnalysisError::GrammarMismatch {
            query_grammar: self.grammar.clone(),
            tree_grammar: tree.grammar_name().to_string(),
        })
    }

    /// Run the query over `node` and its descendants.
    pub fn matches<'t>(&self, node: SyntaxNode<'t>, options: &QueryOptions) -> Result<QueryMatches<'t>> {
        let tree = node.tree();
        self.check_grammar(tree)?;

        let base_depth = node.depth();
        let end = node.subtree_end();
        let mut result = QueryMatches::default();
        let mut binds = Vec::new();
        let mut id = node.id();

        while id < end {
            let Some(candidate) = tree.node(id) else {
                break;
            };

            if let Some(max) = options.max_start_depth {
                if candidate.depth() - base_depth > max {
                    id = candidate.subtree_end();
                    continue;
                }
            }
            match options.relation(&candidate) {
                Relation::Before => {
                    id = candidate.subtree_end();
                    continue;
                }
                Relation::After => break,
                Relation::Inside => {}
            }

            if let Some(found) = self.match_at(candidate, &mut binds) {
                if options
                    .match_limit
                    .is_some_and(|limit| result.matches.len() >= limit)
                {
                    result.limit_exceeded = true;
                    break;
                }
                result.matches.push(found);
            }
            id += 1;
        }

        tracing::trace!(
            grammar = %self.grammar,
            matches = result.matches.len(),
            limit_exceeded = result.limit_exceeded,
            "query finished"
        );
        Ok(result)
    }

    /// Run the query and flatten every match's captures, in match order.
    pub fn captures<'t>(&self, node: SyntaxNode<'t>, options: &QueryOptions) -> Result<QueryCaptures<'t>> {
        let QueryMatches {
            matches,
            limit_exceeded,
        } = self.matches(node, options)?;
        Ok(QueryCaptures {
            captures: matches.into_iter().flat_map(|m| m.captures).collect(),
            limit_exceeded,
        })
    }

    fn match_at<'t>(&self, node: SyntaxNode<'t>, binds: &mut Vec<Binding<'t>>) -> Option<QueryMatch<'t>> {
        for (pattern_index, pattern) in self.patterns.iter().enumerate() {
            if !matcher::match_pattern(pattern, node, binds) {
                continue;
            }
            binds.sort_by_key(|b| b.seq);
            let captures = binds
                .iter()
                .map(|b| QueryCapture {
                    name: Arc::clone(&self.capture_names[b.capture]),
                    index: b.capture,
                    node: b.node,
                })
                .collect();
            return Some(QueryMatch {
                pattern_index,
                anchor: node,
                captures,
            });
        }
        None
    }

    /// Release the query. Dropping it has the same effect.
    pub fn dispose(self) {
        tracing::trace!(grammar = %self.grammar, patterns = self.patterns.len(), "query disposed");
    }
}
