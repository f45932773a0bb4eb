//! Grammar metadata and the seam to the external parser engine.
//!
//! This module provides:
//! - `Grammar`: the node kinds and field names a grammar defines, used to
//!   validate queries before they run
//! - `GrammarEngine` trait: load a grammar by locator and parse text with it
//! - Tree-sitter implementation of the trait (feature `tree-sitter`)

use std::collections::HashSet;
use std::fmt;

use crate::error::Result;
use crate::tree::Tree;

#[cfg(feature = "tree-sitter")]
pub mod treesitter;

/// Kind name of error nodes; every grammar accepts it in queries.
pub const ERROR_KIND: &str = "ERROR";

/// The vocabulary of one grammar.
#[derive(Clone)]
pub struct Grammar {
    name: String,
    locator: String,
    named_kinds: HashSet<String>,
    anonymous_kinds: HashSet<String>,
    fields: HashSet<String>,
}

impl Grammar {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        let mut named_kinds = HashSet::new();
        named_kinds.insert(ERROR_KIND.to_string());
        Self {
            name: name.into(),
            locator: locator.into(),
            named_kinds,
            anonymous_kinds: HashSet::new(),
            fields: HashSet::new(),
        }
    }

    /// Register node kinds; `named` selects named vs anonymous.
    pub fn with_kinds<I, S>(mut self, named: bool, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = if named {
            &mut self.named_kinds
        } else {
            &mut self.anonymous_kinds
        };
        set.extend(kinds.into_iter().map(Into::into));
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Name stamped on trees this grammar produces, e.g. `java`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource locator the grammar was loaded from.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn has_named_kind(&self, kind: &str) -> bool {
        self.named_kinds.contains(kind)
    }

    pub fn has_anonymous_kind(&self, kind: &str) -> bool {
        self.anonymous_kinds.contains(kind)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn kind_count(&self) -> usize {
        self.named_kinds.len() + self.anonymous_kinds.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("locator", &self.locator)
            .field("kinds", &self.kind_count())
            .field("fields", &self.fields.len())
            .finish()
    }
}

/// A parser engine able to load grammars and build [`Tree`]s.
///
/// Implementations adapt a concrete parsing library; nothing outside the
/// implementation sees that library's types.
pub trait GrammarEngine: Send + Sync {
    /// Short engine identifier for logs.
    fn name(&self) -> &str;

    /// Load the grammar identified by `locator`.
    fn load_grammar(&self, locator: &str) -> Result<Grammar>;

    /// Parse `source` with a grammar previously returned by
    /// [`load_grammar`](Self::load_grammar). Trees nested deeper than
    /// `max_depth` fail with `DepthExceeded`.
    fn parse(&self, grammar: &Grammar, source: &str, max_depth: usize) -> Result<Tree>;
}
