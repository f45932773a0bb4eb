//! Codefacts - structural code facts from syntax trees.
//!
//! Codefacts parses source text with a pluggable grammar engine (tree-sitter
//! by default), runs S-expression pattern queries over the resulting syntax
//! trees and extracts named facts: classes, methods, fields, imports, the
//! package and string literals, plus whether the source had syntax errors.
//!
//! # Architecture
//!
//! - `tree`: immutable arena syntax tree with pre-order node ids
//! - `grammar`: grammar vocabulary and the `GrammarEngine` seam
//! - `query`: pattern compiler and matcher
//! - `extract`: per-language query catalogs and fact post-processing
//! - `language`: language registry and grammar locators
//! - `engine`: process-wide grammar and catalog caches
//! - `config`, `error`: engine limits and error taxonomy
//! - `report`, `cli`: the `codefacts` binary
//!
//! # Example
//!
//! ```no_run
//! use codefacts::Language;
//!
//! codefacts::init()?;
//! let facts = codefacts::analyze("class A { void run() {} }", Language::Java)?;
//! assert_eq!(facts.classes, vec!["A"]);
//! # Ok::<(), codefacts::AnalysisError>(())
//! ```

#[cfg(feature = "tree-sitter")]
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod grammar;
pub mod language;
pub mod query;
pub mod report;
pub mod tree;

pub use config::EngineConfig;
pub use engine::{engine, init_with, Engine};
pub use error::{AnalysisError, Result};
pub use extract::{has_syntax_errors, Extractor, FactKind, FileFacts};
pub use grammar::{Grammar, GrammarEngine};
pub use language::Language;
pub use query::{Query, QueryCapture, QueryCaptures, QueryMatch, QueryMatches, QueryOptions};
pub use tree::{NodeSpec, Point, SyntaxNode, Tree, TreeBuilder};

#[cfg(feature = "tree-sitter")]
pub use engine::init_async;
#[cfg(feature = "tree-sitter")]
pub use grammar::treesitter::TreeSitterEngine;

/// Initialize the global engine with default settings.
///
/// Call this once at startup. This is idempotent - calling it multiple times
/// is safe and returns the same engine.
#[cfg(feature = "tree-sitter")]
pub fn init() -> Result<&'static Engine> {
    engine::init()
}

/// Parse `source` as `language` with the global engine and extract every
/// fact.
pub fn analyze(source: &str, language: Language) -> Result<FileFacts> {
    engine()?.analyze(source, language)
}

/// Parse `source` as `language` with the global engine.
pub fn parse(source: &str, language: Language) -> Result<Tree> {
    engine()?.parse(source, language)
}
