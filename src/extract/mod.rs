//! Fact extraction.
//!
//! An [`Extractor`] runs a language's compiled catalog over a [`Tree`] and
//! post-processes the captured text:
//!
//! - classes, methods, fields and imports are de-duplicated, keeping the
//!   first occurrence in source order
//! - only the first package declaration is reported
//! - string literals keep every occurrence
//!
//! Extraction never modifies the tree, so running it twice yields the same
//! facts.

pub(crate) mod catalog;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::language::Language;
use crate::query::{QueryMatch, QueryOptions};
use crate::tree::Tree;

pub(crate) use catalog::CompiledCatalog;

/// The kinds of fact a catalog can extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactKind {
    Classes,
    Methods,
    Fields,
    Imports,
    Package,
    StringLiterals,
}

impl FactKind {
    pub const ALL: [FactKind; 6] = [
        FactKind::Classes,
        FactKind::Methods,
        FactKind::Fields,
        FactKind::Imports,
        FactKind::Package,
        FactKind::StringLiterals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Classes => "classes",
            FactKind::Methods => "methods",
            FactKind::Fields => "fields",
            FactKind::Imports => "imports",
            FactKind::Package => "package",
            FactKind::StringLiterals => "string_literals",
        }
    }

    /// Capture holding the fact's value in catalog queries.
    pub fn capture_name(&self) -> &'static str {
        match self {
            FactKind::Classes | FactKind::Methods | FactKind::Fields => "name",
            FactKind::Imports | FactKind::Package => "path",
            FactKind::StringLiterals => "literal",
        }
    }

    fn deduplicates(&self) -> bool {
        !matches!(self, FactKind::StringLiterals)
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Facts extracted from one source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub language: Language,
    pub classes: Vec<String>,
    pub methods: Vec<String>,
    pub fields: Vec<String>,
    pub imports: Vec<String>,
    pub package: Option<String>,
    pub string_literals: Vec<String>,
    pub has_syntax_errors: bool,
}

impl FileFacts {
    /// Values extracted for `kind`; the package yields at most one.
    pub fn values(&self, kind: FactKind) -> Vec<&str> {
        match kind {
            FactKind::Classes => self.classes.iter().map(String::as_str).collect(),
            FactKind::Methods => self.methods.iter().map(String::as_str).collect(),
            FactKind::Fields => self.fields.iter().map(String::as_str).collect(),
            FactKind::Imports => self.imports.iter().map(String::as_str).collect(),
            FactKind::Package => self.package.as_deref().into_iter().collect(),
            FactKind::StringLiterals => self.string_literals.iter().map(String::as_str).collect(),
        }
    }
}

/// Whether the tree contains any error or missing node.
pub fn has_syntax_errors(tree: &Tree) -> bool {
    let root = tree.root_node();
    root.has_error() || root.is_error()
}

/// Runs one language's catalog against trees of that language.
///
/// Obtained from [`Engine::extractor`](crate::engine::Engine::extractor).
#[derive(Clone, Copy)]
pub struct Extractor<'e> {
    catalog: &'e CompiledCatalog,
    match_limit: Option<usize>,
}

impl<'e> Extractor<'e> {
    pub(crate) fn new(catalog: &'e CompiledCatalog, match_limit: Option<usize>) -> Self {
        Self {
            catalog,
            match_limit,
        }
    }

    pub fn language(&self) -> Language {
        self.catalog.language()
    }

    pub fn classes(&self, tree: &Tree) -> Result<Vec<String>> {
        self.collect(FactKind::Classes, tree)
    }

    pub fn methods(&self, tree: &Tree) -> Result<Vec<String>> {
        self.collect(FactKind::Methods, tree)
    }

    pub fn fields(&self, tree: &Tree) -> Result<Vec<String>> {
        self.collect(FactKind::Fields, tree)
    }

    /// Imported paths. Java wildcard imports end in `.*`; quotes and angle
    /// brackets around string-form imports are removed.
    pub fn imports(&self, tree: &Tree) -> Result<Vec<String>> {
        self.collect(FactKind::Imports, tree)
    }

    pub fn package(&self, tree: &Tree) -> Result<Option<String>> {
        Ok(self.collect(FactKind::Package, tree)?.into_iter().next())
    }

    /// Full text of every string literal, quotes included, in source order.
    pub fn string_literals(&self, tree: &Tree) -> Result<Vec<String>> {
        self.collect(FactKind::StringLiterals, tree)
    }

    pub fn has_syntax_errors(&self, tree: &Tree) -> bool {
        has_syntax_errors(tree)
    }

    /// Every fact at once.
    pub fn facts(&self, tree: &Tree) -> Result<FileFacts> {
        Ok(FileFacts {
            language: self.language(),
            classes: self.classes(tree)?,
            methods: self.methods(tree)?,
            fields: self.fields(tree)?,
            imports: self.imports(tree)?,
            package: self.package(tree)?,
            string_literals: self.string_literals(tree)?,
            has_syntax_errors: self.has_syntax_errors(tree),
        })
    }

    fn collect(&self, kind: FactKind, tree: &Tree) -> Result<Vec<String>> {
        let Some(query) = self.catalog.query(kind) else {
            return Ok(Vec::new());
        };

        let mut options = QueryOptions::new();
        options.match_limit = self.match_limit;
        let result = query.matches(tree.root_node(), &options)?;
        if result.limit_exceeded {
            tracing::warn!(
                fact = %kind,
                limit = ?self.match_limit,
                "match limit reached, facts truncated"
            );
        }

        let mut values = Vec::new();
        let mut seen = HashSet::new();
        for m in &result.matches {
            for node in m.nodes_for_capture(kind.capture_name()) {
                let Some(value) = post_process(kind, node.text(), m) else {
                    continue;
                };
                if kind.deduplicates() && !seen.insert(value.clone()) {
                    continue;
                }
                values.push(value);
                if kind == FactKind::Package {
                    return Ok(values);
                }
            }
        }
        Ok(values)
    }
}

impl fmt::Debug for Extractor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("language", &self.language())
            .field("match_limit", &self.match_limit)
            .finish()
    }
}

fn is_wildcard_import(m: &QueryMatch<'_>) -> bool {
    m.capture("import")
        .is_some_and(|import| import.children().any(|child| child.text() == "*"))
}

/// Turn captured text into a fact value; `None` drops it.
fn post_process(kind: FactKind, text: &str, m: &QueryMatch<'_>) -> Option<String> {
    if kind == FactKind::StringLiterals {
        return Some(text.to_string());
    }

    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if kind != FactKind::Imports {
        return Some(text.to_string());
    }

    let path = strip_delimiters(text);
    if path.is_empty() {
        return None;
    }
    if is_wildcard_import(m) {
        Some(format!("{}.*", path))
    } else {
        Some(path.to_string())
    }
}

fn strip_delimiters(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('`', '`'), ('<', '>')] {
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_delimiters() {
        assert_eq!(strip_delimiters("\"fmt\""), "fmt");
        assert_eq!(strip_delimiters("'./util'"), "./util");
        assert_eq!(strip_delimiters("<stdio.h>"), "stdio.h");
        assert_eq!(strip_delimiters("java.util.List"), "java.util.List");
        assert_eq!(strip_delimiters("\""), "\"");
    }

    #[test]
    fn test_fact_kind_names() {
        let names: Vec<&str> = FactKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["classes", "methods", "fields", "imports", "package", "string_literals"]
        );
        assert_eq!(FactKind::Package.capture_name(), "path");
        assert!(!FactKind::StringLiterals.deduplicates());
        assert!(FactKind::Imports.deduplicates());
    }

    #[test]
    fn test_file_facts_values() {
        let facts = FileFacts {
            language: Language::Java,
            classes: vec!["A".to_string()],
            methods: vec![],
            fields: vec![],
            imports: vec![],
            package: Some("com.example".to_string()),
            string_literals: vec!["\"x\"".to_string(), "\"x\"".to_string()],
            has_syntax_errors: false,
        };
        assert_eq!(facts.values(FactKind::Package), vec!["com.example"]);
        assert_eq!(facts.values(FactKind::StringLiterals).len(), 2);

        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["language"], "java");
        assert_eq!(json["package"], "com.example");
        assert_eq!(json["has_syntax_errors"], false);
    }
}

#[cfg(all(test, feature = "tree-sitter"))]
mod java_tests {
    use super::*;
    use crate::grammar::treesitter::TreeSitterEngine;
    use crate::grammar::GrammarEngine;

    fn extract(source: &str) -> FileFacts {
        extract_limited(source, None)
    }

    fn extract_limited(source: &str, limit: Option<usize>) -> FileFacts {
        let engine = TreeSitterEngine::new();
        let grammar = engine.load_grammar("tree-sitter-java").unwrap();
        let tree = engine.parse(&grammar, source, 1024).unwrap();
        let catalog = CompiledCatalog::compile(Language::Java, &grammar, 64).unwrap();
        Extractor::new(&catalog, limit).facts(&tree).unwrap()
    }

    #[test]
    fn test_package_and_imports() {
        let facts = extract(
            r#"
package com.example.app;

import java.util.List;
import java.util.*;
import static org.junit.Assert.assertEquals;
import java.util.List;

class App {}
"#,
        );
        assert_eq!(facts.package.as_deref(), Some("com.example.app"));
        assert_eq!(
            facts.imports,
            vec![
                "java.util.List",
                "java.util.*",
                "org.junit.Assert.assertEquals",
            ]
        );
    }

    #[test]
    fn test_fields_and_constructors() {
        let facts = extract(
            r#"
class Point {
    private int x, y;
    private String label = "origin";
    Point() {}
    int getX() { return x; }
}
"#,
        );
        assert_eq!(facts.classes, vec!["Point"]);
        assert_eq!(facts.fields, vec!["x", "y", "label"]);
        assert_eq!(facts.methods, vec!["Point", "getX"]);
        assert_eq!(facts.string_literals, vec!["\"origin\""]);
    }

    #[test]
    fn test_nested_classes_in_source_order() {
        let facts = extract("class Outer { class Inner {} } class Second {}");
        assert_eq!(facts.classes, vec!["Outer", "Inner", "Second"]);
    }

    #[test]
    fn test_match_limit_truncates() {
        let facts = extract_limited("class A {} class B {} class C {}", Some(2));
        assert_eq!(facts.classes, vec!["A", "B"]);
    }
}
