//! Engine configuration.
//!
//! Limits that bound work on untrusted input, loaded from YAML:
//!
//! ```yaml
//! max_tree_depth: 1024
//! max_pattern_depth: 64
//! default_match_limit: 10000
//! preload: [java, python]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{AnalysisError, Result};
use crate::language::Language;
use crate::tree::DEFAULT_MAX_DEPTH;

/// Default nesting bound for query patterns.
pub const DEFAULT_MAX_PATTERN_DEPTH: usize = 64;

/// File names searched for a configuration file.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["codefacts.yaml", ".codefacts.yaml"];

/// Limits and startup options for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Syntax trees nested deeper than this fail with `DepthExceeded`.
    pub max_tree_depth: usize,
    /// Query patterns nested deeper than this fail with `DepthExceeded`.
    pub max_pattern_depth: usize,
    /// Match limit applied by extraction catalogs; `None` means unbounded.
    pub default_match_limit: Option<usize>,
    /// Grammars to load eagerly during initialization.
    pub preload: Vec<Language>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tree_depth: DEFAULT_MAX_DEPTH,
            max_pattern_depth: DEFAULT_MAX_PATTERN_DEPTH,
            default_match_limit: None,
            preload: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from YAML text and validate it.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(content).map_err(|e| AnalysisError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AnalysisError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content)
    }

    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_tree_depth == 0 {
            return Err(AnalysisError::Config {
                message: "max_tree_depth must be at least 1".to_string(),
            });
        }
        if self.max_pattern_depth == 0 {
            return Err(AnalysisError::Config {
                message: "max_pattern_depth must be at least 1".to_string(),
            });
        }
        if self.default_match_limit == Some(0) {
            return Err(AnalysisError::Config {
                message: "default_match_limit must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_tree_depth, 1024);
        assert_eq!(config.max_pattern_depth, 64);
        assert_eq!(config.default_match_limit, None);
        assert!(config.preload.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml("max_tree_depth: 200\npreload: [java, c_sharp]\n").unwrap();
        assert_eq!(config.max_tree_depth, 200);
        assert_eq!(config.max_pattern_depth, DEFAULT_MAX_PATTERN_DEPTH);
        assert_eq!(config.preload, vec![Language::Java, Language::CSharp]);
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_limits() {
        assert!(matches!(
            EngineConfig::from_yaml("max_depth: 3"),
            Err(AnalysisError::Config { .. })
        ));
        assert!(matches!(
            EngineConfig::from_yaml("max_pattern_depth: 0"),
            Err(AnalysisError::Config { .. })
        ));
        assert!(matches!(
            EngineConfig::from_yaml("default_match_limit: 0"),
            Err(AnalysisError::Config { .. })
        ));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_match_limit: 500").unwrap();
        let config = EngineConfig::parse_file(file.path()).unwrap();
        assert_eq!(config.default_match_limit, Some(500));

        let err = EngineConfig::parse_file("/nonexistent/codefacts.yaml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
