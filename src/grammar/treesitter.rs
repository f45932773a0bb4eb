//! Tree-sitter based grammar engine.
//!
//! Grammars are linked into the binary; a locator such as
//! `tree-sitter-java` selects one. Parsed tree-sitter trees are copied into
//! the crate's own [`Tree`] arena with a cursor walk, so callers never hold
//! tree-sitter types.

use tree_sitter::{Language, Parser as TsParser, TreeCursor};

use super::{Grammar, GrammarEngine};
use crate::error::{AnalysisError, Result};
use crate::tree::{NodeSpec, Tree, TreeBuilder};

/// Prefix shared by every locator this engine understands.
pub const LOCATOR_PREFIX: &str = "tree-sitter-";

/// Tree-sitter implementation of [`GrammarEngine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterEngine;

impl TreeSitterEngine {
    pub fn new() -> Self {
        Self
    }

    /// Locators of every grammar linked into this build.
    pub fn linked_locators() -> &'static [&'static str] {
        &[
            "tree-sitter-c",
            "tree-sitter-cpp",
            "tree-sitter-go",
            "tree-sitter-java",
            "tree-sitter-javascript",
            "tree-sitter-python",
            "tree-sitter-rust",
            "tree-sitter-scala",
            "tree-sitter-swift",
            "tree-sitter-typescript",
        ]
    }

    fn linked_language(locator: &str) -> Option<Language> {
        let language = match locator {
            "tree-sitter-c" => tree_sitter_c::LANGUAGE.into(),
            "tree-sitter-cpp" => tree_sitter_cpp::LANGUAGE.into(),
            "tree-sitter-go" => tree_sitter_go::LANGUAGE.into(),
            "tree-sitter-java" => tree_sitter_java::LANGUAGE.into(),
            "tree-sitter-javascript" => tree_sitter_javascript::LANGUAGE.into(),
            "tree-sitter-python" => tree_sitter_python::LANGUAGE.into(),
            "tree-sitter-rust" => tree_sitter_rust::LANGUAGE.into(),
            "tree-sitter-scala" => tree_sitter_scala::LANGUAGE.into(),
            "tree-sitter-swift" => tree_sitter_swift::LANGUAGE.into(),
            "tree-sitter-typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            _ => return None,
        };
        Some(language)
    }

    fn language_for(locator: &str) -> Result<Language> {
        Self::linked_language(locator).ok_or_else(|| {
            AnalysisError::grammar_load(locator, "grammar is not linked into this build")
        })
    }

    fn create_parser(locator: &str, language: &Language) -> Result<TsParser> {
        let mut parser = TsParser::new();
        parser
            .set_language(language)
            .map_err(|e| AnalysisError::grammar_load(locator, e.to_string()))?;
        Ok(parser)
    }
}

fn node_spec(cursor: &TreeCursor<'_>) -> NodeSpec {
    let node = cursor.node();
    NodeSpec {
        kind: node.kind(),
        named: node.is_named(),
        field: cursor.field_name(),
        byte_range: node.byte_range(),
        is_error: node.is_error(),
        is_missing: node.is_missing(),
        is_extra: node.is_extra(),
    }
}

impl GrammarEngine for TreeSitterEngine {
    fn name(&self) -> &str {
        "tree-sitter"
    }

    fn load_grammar(&self, locator: &str) -> Result<Grammar> {
        let language = Self::language_for(locator)?;
        // Fails on an ABI mismatch between the grammar and the runtime.
        Self::create_parser(locator, &language)?;

        let name = locator.strip_prefix(LOCATOR_PREFIX).unwrap_or(locator);
        let mut named = Vec::new();
        let mut anonymous = Vec::new();
        for id in 0..language.node_kind_count() {
            let id = id as u16;
            if let Some(kind) = language.node_kind_for_id(id) {
                if language.node_kind_is_named(id) {
                    named.push(kind);
                } else {
                    anonymous.push(kind);
                }
            }
        }
        // Field ids start at 1.
        let fields: Vec<&str> = (1..=language.field_count())
            .filter_map(|id| language.field_name_for_id(id as u16))
            .collect();

        Ok(Grammar::new(name, locator)
            .with_kinds(true, named)
            .with_kinds(false, anonymous)
            .with_fields(fields))
    }

    fn parse(&self, grammar: &Grammar, source: &str, max_depth: usize) -> Result<Tree> {
        let language = Self::language_for(grammar.locator())?;
        let mut parser = Self::create_parser(grammar.locator(), &language)?;
        let ts_tree = parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::ParseFailure {
                grammar: grammar.name().to_string(),
                reason: "parser returned no tree".to_string(),
            })?;

        let mut builder = TreeBuilder::new(grammar.name(), source).with_max_depth(max_depth);
        let mut cursor = ts_tree.walk();
        'walk: loop {
            builder.open(node_spec(&cursor))?;
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                builder.close()?;
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }
        builder.finish()
    }
}
