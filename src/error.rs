//! Error taxonomy for parsing, querying and extraction.

use thiserror::Error;

/// Errors that can occur while loading grammars, building trees, compiling
/// queries or running them.
///
/// Syntax errors inside analyzed source are not errors: they show up as
/// `has_error` on tree nodes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("engine used before initialization; call codefacts::init() first")]
    UninitializedEngine,

    #[error("unsupported language: {name:?}")]
    UnsupportedLanguage { name: String },

    #[error("failed to load grammar {locator:?}: {reason}")]
    GrammarLoadFailure { locator: String, reason: String },

    #[error("invalid query for grammar {grammar:?} at offset {offset}: {message}")]
    InvalidQuery {
        grammar: String,
        offset: usize,
        message: String,
    },

    #[error("query compiled for grammar {query_grammar:?} cannot run on a tree parsed with {tree_grammar:?}")]
    GrammarMismatch {
        query_grammar: String,
        tree_grammar: String,
    },

    #[error("{context} exceeds maximum depth of {limit}")]
    DepthExceeded { limit: usize, context: String },

    #[error("malformed syntax tree: {message}")]
    MalformedTree { message: String },

    #[error("failed to parse {grammar} source: {reason}")]
    ParseFailure { grammar: String, reason: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl AnalysisError {
    pub(crate) fn invalid_query(
        grammar: impl Into<String>,
        offset: usize,
        message: impl Into<String>,
    ) -> Self {
        AnalysisError::InvalidQuery {
            grammar: grammar.into(),
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn depth_exceeded(limit: usize, context: impl Into<String>) -> Self {
        AnalysisError::DepthExceeded {
            limit,
            context: context.into(),
        }
    }

    pub(crate) fn grammar_load(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::GrammarLoadFailure {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error signals misuse of the engine by the calling code
    /// rather than bad input data.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            AnalysisError::UninitializedEngine | AnalysisError::GrammarMismatch { .. }
        )
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, AnalysisError>;
