//! Incremental construction of [`Tree`]s by grammar engine adapters.

use std::ops::Range;
use std::sync::Arc;

use super::{NodeData, Point, Tree};
use crate::error::{AnalysisError, Result};

/// Default maximum nesting depth accepted by a [`TreeBuilder`].
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Description of one node handed to [`TreeBuilder::open`].
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub kind: &'static str,
    pub named: bool,
    pub field: Option<&'static str>,
    pub byte_range: Range<usize>,
    pub is_error: bool,
    pub is_missing: bool,
    pub is_extra: bool,
}

impl NodeSpec {
    pub fn named(kind: &'static str, byte_range: Range<usize>) -> Self {
        Self {
            kind,
            named: true,
            field: None,
            byte_range,
            is_error: false,
            is_missing: false,
            is_extra: false,
        }
    }

    pub fn anonymous(kind: &'static str, byte_range: Range<usize>) -> Self {
        Self {
            named: false,
            ..Self::named(kind, byte_range)
        }
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn error(mut self) -> Self {
        self.is_error = true;
        self
    }

    pub fn missing(mut self) -> Self {
        self.is_missing = true;
        self
    }

    pub fn extra(mut self) -> Self {
        self.is_extra = true;
        self
    }
}

/// Builds a [`Tree`] from a pre-order stream of `open`/`close` events.
///
/// Positions are derived from byte offsets, `has_error` is propagated on
/// close, and the containment/ordering invariants are checked as nodes
/// arrive.
pub struct TreeBuilder {
    grammar: Arc<str>,
    source: Arc<str>,
    line_starts: Vec<usize>,
    nodes: Vec<NodeData>,
    open: Vec<usize>,
    max_depth: usize,
}

impl TreeBuilder {
    pub fn new(grammar: impl Into<Arc<str>>, source: impl Into<Arc<str>>) -> Self {
        let source: Arc<str> = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            grammar: grammar.into(),
            source,
            line_starts,
            nodes: Vec::new(),
            open: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Reject nodes nested deeper than `max_depth` below the root.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn point_at(&self, byte: usize) -> Point {
        let row = self.line_starts.partition_point(|&start| start <= byte) - 1;
        Point {
            row,
            column: byte - self.line_starts[row],
        }
    }

    fn malformed(message: String) -> AnalysisError {
        AnalysisError::MalformedTree { message }
    }

    /// Start a node; it becomes the parent of subsequent nodes until
    /// [`close`](Self::close) is called.
    pub fn open(&mut self, spec: NodeSpec) -> Result<()> {
        if self.open.is_empty() && !self.nodes.is_empty() {
            return Err(Self::malformed(format!(
                "second root node {:?} after the tree was closed",
                spec.kind
            )));
        }

        let depth = self.open.len();
        if depth > self.max_depth {
            return Err(AnalysisError::depth_exceeded(self.max_depth, "syntax tree"));
        }

        let range = spec.byte_range;
        if range.start > range.end || range.end > self.source.len() {
            return Err(Self::malformed(format!(
                "node {:?} has range {:?} outside source of {} bytes",
                spec.kind,
                range,
                self.source.len()
            )));
        }

        let parent = self.open.last().copied();
        if let Some(parent_id) = parent {
            let parent_data = &self.nodes[parent_id];
            if range.start < parent_data.bytes.start || range.end > parent_data.bytes.end {
                return Err(Self::malformed(format!(
                    "node {:?} {:?} escapes parent {:?} {:?}",
                    spec.kind, range, parent_data.kind, parent_data.bytes
                )));
            }
            if let Some(&prev) = parent_data.children.last() {
                let prev_data = &self.nodes[prev];
                if prev_data.bytes.end > range.start {
                    return Err(Self::malformed(format!(
                        "node {:?} {:?} overlaps previous sibling {:?} {:?}",
                        spec.kind, range, prev_data.kind, prev_data.bytes
                    )));
                }
            }
        }

        let id = self.nodes.len();
        let start = self.point_at(range.start);
        let end = self.point_at(range.end);
        self.nodes.push(NodeData {
            kind: spec.kind,
            field: spec.field,
            named: spec.named,
            error: spec.is_error,
            missing: spec.is_missing,
            extra: spec.is_extra,
            has_error: spec.is_error || spec.is_missing,
            bytes: range,
            start,
            end,
            parent,
            children: Vec::new(),
            depth,
            subtree_end: id + 1,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id].children.push(id);
        }
        self.open.push(id);
        Ok(())
    }

    /// Finish the most recently opened node.
    pub fn close(&mut self) -> Result<()> {
        let id = self
            .open
            .pop()
            .ok_or_else(|| Self::malformed("close() without a matching open()".to_string()))?;
        let child_error = self.nodes[id]
            .children
            .iter()
            .any(|&child| self.nodes[child].has_error);
        let end = self.nodes.len();
        let data = &mut self.nodes[id];
        data.has_error |= child_error;
        data.subtree_end = end;
        Ok(())
    }

    /// Open and immediately close a node without children.
    pub fn leaf(&mut self, spec: NodeSpec) -> Result<()> {
        self.open(spec)?;
        self.close()
    }

    pub fn finish(self) -> Result<Tree> {
        if let Some(&id) = self.open.last() {
            return Err(Self::malformed(format!(
                "node {:?} was never closed",
                self.nodes[id].kind
            )));
        }
        if self.nodes.is_empty() {
            return Err(Self::malformed("tree has no root node".to_string()));
        }
        Ok(Tree {
            grammar: self.grammar,
            source: self.source,
            nodes: self.nodes,
        })
    }
}
