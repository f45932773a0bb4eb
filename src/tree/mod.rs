//! Immutable syntax tree model.
//!
//! A [`Tree`] is an arena of nodes stored in pre-order: the root has id 0 and
//! every subtree occupies the contiguous id range `[id, subtree_end)`. That
//! layout makes traversal a range walk, so no operation here recurses over
//! tree depth. Node text is always sliced from the shared source buffer by
//! byte range.

mod builder;

pub use builder::{NodeSpec, TreeBuilder, DEFAULT_MAX_DEPTH};

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A zero-based row/column position. Columns count bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Displayed 1-indexed, the way editors show positions.
        write!(f, "{}:{}", self.row + 1, self.column + 1)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: &'static str,
    pub(crate) field: Option<&'static str>,
    pub(crate) named: bool,
    pub(crate) error: bool,
    pub(crate) missing: bool,
    pub(crate) extra: bool,
    pub(crate) has_error: bool,
    pub(crate) bytes: Range<usize>,
    pub(crate) start: Point,
    pub(crate) end: Point,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) depth: usize,
    pub(crate) subtree_end: usize,
}

/// A parsed syntax tree. Immutable once built.
pub struct Tree {
    grammar: Arc<str>,
    source: Arc<str>,
    nodes: Vec<NodeData>,
}

impl Tree {
    /// Name of the grammar that produced this tree.
    pub fn grammar_name(&self) -> &str {
        &self.grammar
    }

    /// The full source text the tree was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shared handle to the source buffer.
    pub fn source_arc(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn root_node(&self) -> SyntaxNode<'_> {
        SyntaxNode { tree: self, id: 0 }
    }

    /// Total number of nodes, named and anonymous.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Pre-order walk over every node of the tree.
    pub fn walk(&self) -> Descendants<'_> {
        self.root_node().descendants()
    }

    /// Look up a node by its pre-order id.
    pub fn node(&self, id: usize) -> Option<SyntaxNode<'_>> {
        (id < self.nodes.len()).then_some(SyntaxNode { tree: self, id })
    }

    fn data(&self, id: usize) -> &NodeData {
        &self.nodes[id]
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("grammar", &self.grammar)
            .field("nodes", &self.nodes.len())
            .field("source_len", &self.source.len())
            .finish()
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root_node().to_sexp())
    }
}

/// A handle to one node of a [`Tree`].
#[derive(Clone, Copy)]
pub struct SyntaxNode<'t> {
    tree: &'t Tree,
    id: usize,
}

impl<'t> SyntaxNode<'t> {
    fn data(&self) -> &'t NodeData {
        self.tree.data(self.id)
    }

    fn at(&self, id: usize) -> SyntaxNode<'t> {
        SyntaxNode {
            tree: self.tree,
            id,
        }
    }

    /// Pre-order id; ids order nodes by their position in the tree.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// Grammar node type, e.g. `method_declaration`.
    pub fn kind(&self) -> &'static str {
        self.data().kind
    }

    pub fn is_named(&self) -> bool {
        self.data().named
    }

    pub fn is_error(&self) -> bool {
        self.data().error
    }

    /// Whether the parser inserted this node to recover from an error.
    pub fn is_missing(&self) -> bool {
        self.data().missing
    }

    /// Whether the node is an extra such as a comment.
    pub fn is_extra(&self) -> bool {
        self.data().extra
    }

    /// Whether this node or any descendant is an error or missing node.
    pub fn has_error(&self) -> bool {
        self.data().has_error
    }

    pub fn start_position(&self) -> Point {
        self.data().start
    }

    pub fn end_position(&self) -> Point {
        self.data().end
    }

    pub fn start_byte(&self) -> usize {
        self.data().bytes.start
    }

    pub fn end_byte(&self) -> usize {
        self.data().bytes.end
    }

    pub fn byte_range(&self) -> Range<usize> {
        self.data().bytes.clone()
    }

    /// Source text covered by this node, including any elided whitespace
    /// and comments inside its range.
    pub fn text(&self) -> &'t str {
        self.tree.source.get(self.data().bytes.clone()).unwrap_or("")
    }

    /// Nesting depth; the root is at depth 0.
    pub fn depth(&self) -> usize {
        self.data().depth
    }

    /// Field label under which this node hangs off its parent.
    pub fn field_name(&self) -> Option<&'static str> {
        self.data().field
    }

    pub fn parent(&self) -> Option<SyntaxNode<'t>> {
        self.data().parent.map(|id| self.at(id))
    }

    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    pub fn named_child_count(&self) -> usize {
        self.named_children().count()
    }

    pub fn child(&self, index: usize) -> Option<SyntaxNode<'t>> {
        self.data().children.get(index).map(|&id| self.at(id))
    }

    /// All children in source order.
    pub fn children(&self) -> impl Iterator<Item = SyntaxNode<'t>> + 't {
        let tree = self.tree;
        self.data()
            .children
            .iter()
            .map(move |&id| SyntaxNode { tree, id })
    }

    pub fn named_children(&self) -> impl Iterator<Item = SyntaxNode<'t>> + 't {
        self.children().filter(|c| c.is_named())
    }

    /// First child labeled with `field`.
    pub fn child_by_field_name(&self, field: &str) -> Option<SyntaxNode<'t>> {
        self.children().find(|c| c.field_name() == Some(field))
    }

    /// Every child labeled with `field`.
    pub fn children_by_field_name<'f>(
        &self,
        field: &'f str,
    ) -> impl Iterator<Item = SyntaxNode<'t>> + 'f
    where
        't: 'f,
    {
        self.children().filter(move |c| c.field_name() == Some(field))
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        self.data().subtree_end - self.id - 1
    }

    pub(crate) fn subtree_end(&self) -> usize {
        self.data().subtree_end
    }

    /// Pre-order iterator over this node and everything below it.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            next: self.id,
            end: self.data().subtree_end,
        }
    }

    /// Smallest node in this subtree whose range covers `start..end`.
    pub fn descendant_for_byte_range(&self, start: usize, end: usize) -> Option<SyntaxNode<'t>> {
        let covers = |n: &SyntaxNode<'t>| n.start_byte() <= start && end <= n.end_byte();
        if !covers(self) {
            return None;
        }
        let mut current = *self;
        while let Some(child) = current.children().find(|c| covers(c)) {
            current = child;
        }
        Some(current)
    }

    /// S-expression of the named structure below this node, with field
    /// labels, in the style tree-sitter prints trees.
    pub fn to_sexp(&self) -> String {
        let mut out = String::new();
        // Subtree ends of the named nodes whose parens are still open.
        let mut open: Vec<usize> = Vec::new();

        for node in self.descendants() {
            while open.last().is_some_and(|&end| end <= node.id) {
                open.pop();
                out.push(')');
            }
            if !node.is_named() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            if node.id != self.id {
                if let Some(field) = node.field_name() {
                    out.push_str(field);
                    out.push_str(": ");
                }
            }
            out.push('(');
            if node.is_missing() {
                out.push_str("MISSING ");
            }
            out.push_str(node.kind());
            open.push(node.subtree_end());
        }
        for _ in open {
            out.push(')');
        }
        out
    }
}

impl PartialEq for SyntaxNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for SyntaxNode<'_> {}

impl fmt::Debug for SyntaxNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Node {} {}-{}}}",
            self.kind(),
            self.start_position(),
            self.end_position()
        )
    }
}

/// Pre-order iterator over a subtree. Restartable: each call to
/// [`SyntaxNode::descendants`] yields the same sequence.
#[derive(Clone)]
pub struct Descendants<'t> {
    tree: &'t Tree,
    next: usize,
    end: usize,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = SyntaxNode<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let node = SyntaxNode {
            tree: self.tree,
            id: self.next,
        };
        self.next += 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Descendants<'_> {}
