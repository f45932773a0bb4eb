//! Process-wide analysis engine.
//!
//! The engine owns the grammar engine backend and two per-language caches:
//! the loaded [`Grammar`] and the compiled extraction catalog. Both are
//! filled on first use and shared read-only afterwards. A load that fails is
//! not cached; the next call retries it.
//!
//! # Lifecycle
//!
//! The global engine is created exactly once by [`init`], [`init_with`] or
//! [`init_async`] and lives for the rest of the process. Later init calls
//! return the existing engine unchanged. [`engine`] fails with
//! `UninitializedEngine` until one of them has run.
//!
//! [`Engine::new`] builds a standalone engine that is not installed
//! globally, which is what tests and embedders with their own backend use.

use once_cell::sync::OnceCell;

use crate::config::EngineConfig;
use crate::error::{AnalysisError, Result};
use crate::extract::{CompiledCatalog, Extractor, FileFacts};
use crate::grammar::{Grammar, GrammarEngine};
use crate::language::{Language, LANGUAGE_COUNT};
use crate::query::Query;
use crate::tree::Tree;

#[cfg(feature = "tree-sitter")]
use crate::grammar::treesitter::TreeSitterEngine;

static ENGINE: OnceCell<Engine> = OnceCell::new();

struct LanguageSlot {
    grammar: Grammar,
    catalog: OnceCell<CompiledCatalog>,
}

pub struct Engine {
    config: EngineConfig,
    backend: Box<dyn GrammarEngine>,
    slots: [OnceCell<LanguageSlot>; LANGUAGE_COUNT],
}

impl Engine {
    pub fn new(config: EngineConfig, backend: Box<dyn GrammarEngine>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            slots: std::array::from_fn(|_| OnceCell::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn slot(&self, language: Language) -> Result<&LanguageSlot> {
        self.slots[language.ordinal()].get_or_try_init(|| {
            let locator = language.grammar_locator();
            tracing::debug!(
                language = %language,
                locator = %locator,
                backend = self.backend.name(),
                "loading grammar"
            );
            let grammar = self.backend.load_grammar(&locator).map_err(|e| {
                tracing::debug!(locator = %locator, error = %e, "grammar load failed");
                e
            })?;
            Ok(LanguageSlot {
                grammar,
                catalog: OnceCell::new(),
            })
        })
    }

    /// The grammar for `language`, loading it on first use.
    pub fn grammar(&self, language: Language) -> Result<&Grammar> {
        self.slot(language).map(|slot| &slot.grammar)
    }

    /// Whether the grammar for `language` has been loaded.
    pub fn is_loaded(&self, language: Language) -> bool {
        self.slots[language.ordinal()].get().is_some()
    }

    /// Load every grammar in `languages`, stopping at the first failure.
    pub fn preload(&self, languages: &[Language]) -> Result<()> {
        for language in languages {
            self.grammar(*language)?;
        }
        Ok(())
    }

    /// Parse `source` as `language`.
    ///
    /// Syntax errors in the source are not failures; they show up as error
    /// nodes and `has_error` in the returned tree.
    pub fn parse(&self, source: &str, language: Language) -> Result<Tree> {
        let grammar = self.grammar(language)?;
        self.backend
            .parse(grammar, source, self.config.max_tree_depth)
    }

    /// Compile an ad-hoc query against `language`'s grammar.
    pub fn compile(&self, language: Language, pattern: &str) -> Result<Query> {
        let grammar = self.grammar(language)?;
        Query::with_max_depth(grammar, pattern, self.config.max_pattern_depth)
    }

    /// The extractor for `language`, compiling its catalog on first use.
    pub fn extractor(&self, language: Language) -> Result<Extractor<'_>> {
        let slot = self.slot(language)?;
        let catalog = slot.catalog.get_or_try_init(|| {
            CompiledCatalog::compile(language, &slot.grammar, self.config.max_pattern_depth)
        })?;
        Ok(Extractor::new(catalog, self.config.default_match_limit))
    }

    /// Parse `source` and extract every fact.
    pub fn analyze(&self, source: &str, language: Language) -> Result<FileFacts> {
        let tree = self.parse(source, language)?;
        self.extractor(language)?.facts(&tree)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded: Vec<Language> = Language::all()
            .iter()
            .copied()
            .filter(|l| self.is_loaded(*l))
            .collect();
        f.debug_struct("Engine")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("loaded", &loaded)
            .finish()
    }
}

fn install(config: EngineConfig, backend: Box<dyn GrammarEngine>) -> Result<&'static Engine> {
    let mut created = false;
    let engine = ENGINE.get_or_try_init(|| {
        created = true;
        Engine::new(config, backend)
    })?;
    if created {
        tracing::debug!(backend = engine.backend_name(), "engine initialized");
    } else {
        tracing::debug!("engine already initialized, keeping existing configuration");
    }
    Ok(engine)
}

/// Install the global engine with `config` and `backend`, then preload the
/// grammars listed in `config.preload`.
pub fn init_with(config: EngineConfig, backend: Box<dyn GrammarEngine>) -> Result<&'static Engine> {
    let preload = config.preload.clone();
    let engine = install(config, backend)?;
    engine.preload(&preload)?;
    Ok(engine)
}

/// Install the global engine with the default configuration and the
/// tree-sitter backend. Safe to call any number of times from any thread.
#[cfg(feature = "tree-sitter")]
pub fn init() -> Result<&'static Engine> {
    init_with(EngineConfig::default(), Box::new(TreeSitterEngine::new()))
}

/// Like [`init_with`] with the tree-sitter backend, loading the preload
/// grammars concurrently on tokio's blocking pool.
#[cfg(feature = "tree-sitter")]
pub async fn init_async(config: EngineConfig) -> Result<&'static Engine> {
    let preload = config.preload.clone();
    let engine = install(config, Box::new(TreeSitterEngine::new()))?;

    let loads = preload.into_iter().map(|language| async move {
        tokio::task::spawn_blocking(move || engine.grammar(language).map(|_| ()))
            .await
            .map_err(|e| {
                AnalysisError::grammar_load(
                    language.grammar_locator(),
                    format!("loader task failed: {}", e),
                )
            })?
    });
    futures::future::try_join_all(loads).await?;
    Ok(engine)
}

/// The global engine.
pub fn engine() -> Result<&'static Engine> {
    ENGINE.get().ok_or_else(|| {
        tracing::error!("analysis engine used before init");
        AnalysisError::UninitializedEngine
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeSpec, TreeBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend whose grammars know a single `program` kind; the first
    /// `failures` loads fail.
    struct CountingBackend {
        loads: Arc<AtomicUsize>,
        failures: usize,
    }

    impl GrammarEngine for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn load_grammar(&self, locator: &str) -> Result<Grammar> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(AnalysisError::grammar_load(locator, "flaky"));
            }
            let name = locator.trim_start_matches("tree-sitter-");
            Ok(Grammar::new(name, locator).with_kinds(true, ["program"]))
        }

        fn parse(&self, grammar: &Grammar, source: &str, max_depth: usize) -> Result<Tree> {
            let mut builder = TreeBuilder::new(grammar.name(), source).with_max_depth(max_depth);
            builder.leaf(NodeSpec::named("program", 0..source.len()))?;
            builder.finish()
        }
    }

    fn counting_engine(failures: usize) -> (Engine, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            loads: Arc::clone(&loads),
            failures,
        };
        (
            Engine::new(EngineConfig::default(), Box::new(backend)).unwrap(),
            loads,
        )
    }

    #[test]
    fn test_grammar_is_loaded_once() {
        let (engine, loads) = counting_engine(0);
        assert!(!engine.is_loaded(Language::Lua));
        let first = engine.grammar(Language::Lua).unwrap() as *const Grammar;
        let second = engine.grammar(Language::Lua).unwrap() as *const Grammar;
        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(engine.is_loaded(Language::Lua));
    }

    #[test]
    fn test_failed_loads_are_retried() {
        let (engine, loads) = counting_engine(1);
        let err = engine.grammar(Language::Ruby).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::GrammarLoadFailure {
                locator: "tree-sitter-ruby".to_string(),
                reason: "flaky".to_string(),
            }
        );
        assert!(!engine.is_loaded(Language::Ruby));
        assert_eq!(engine.grammar(Language::Ruby).unwrap().name(), "ruby");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_and_compile_use_cached_grammar() {
        let (engine, loads) = counting_engine(0);
        let tree = engine.parse("puts 1", Language::Ruby).unwrap();
        assert_eq!(tree.grammar_name(), "ruby");
        let query = engine.compile(Language::Ruby, "(program) @p").unwrap();
        let found = query
            .matches(tree.root_node(), &crate::query::QueryOptions::new())
            .unwrap();
        assert_eq!(found.matches.len(), 1);
        assert!(matches!(
            engine.compile(Language::Ruby, "(method)"),
            Err(AnalysisError::InvalidQuery { .. })
        ));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_languages_without_catalog_extract_nothing() {
        let (engine, _) = counting_engine(0);
        let facts = engine.analyze("echo hi", Language::Bash).unwrap();
        assert_eq!(facts.language, Language::Bash);
        assert!(facts.classes.is_empty());
        assert_eq!(facts.package, None);
        assert!(!facts.has_syntax_errors);
    }

    #[test]
    fn test_config_accessors() {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend { loads, failures: 0 };
        let config = EngineConfig {
            max_tree_depth: 7,
            ..EngineConfig::default()
        };
        let engine = Engine::new(config, Box::new(backend)).unwrap();
        assert_eq!(engine.config().max_tree_depth, 7);
        assert_eq!(engine.backend_name(), "counting");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let loads = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend { loads, failures: 0 };
        let config = EngineConfig {
            max_pattern_depth: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(config, Box::new(backend)),
            Err(AnalysisError::Config { .. })
        ));
    }

    #[cfg(feature = "tree-sitter")]
    #[test]
    fn test_java_extractor_is_cached() {
        let engine = Engine::new(EngineConfig::default(), Box::new(TreeSitterEngine::new())).unwrap();
        let a = engine.extractor(Language::Java).unwrap();
        let b = engine.extractor(Language::Java).unwrap();
        assert_eq!(a.language(), b.language());

        let facts = engine
            .analyze("class A { void run() {} }", Language::Java)
            .unwrap();
        assert_eq!(facts.classes, vec!["A"]);
        assert_eq!(facts.methods, vec!["run"]);
    }

    #[cfg(feature = "tree-sitter")]
    #[test]
    fn test_unlinked_grammar_fails_to_load() {
        let engine = Engine::new(EngineConfig::default(), Box::new(TreeSitterEngine::new())).unwrap();
        let err = engine.parse("x = 1", Language::Kotlin).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::GrammarLoadFailure {
                locator: "tree-sitter-kotlin".to_string(),
                reason: "grammar is not linked into this build".to_string(),
            }
        );
    }
}
