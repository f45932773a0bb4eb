//! Async initialization with concurrent grammar preloading.

#![cfg(feature = "tree-sitter")]

use codefacts::{EngineConfig, Language};

#[tokio::test]
async fn test_init_async_preloads_grammars() {
    let config = EngineConfig {
        preload: vec![Language::Java, Language::Python, Language::Go],
        ..EngineConfig::default()
    };
    let engine = codefacts::init_async(config).await.unwrap();

    assert!(engine.is_loaded(Language::Java));
    assert!(engine.is_loaded(Language::Python));
    assert!(engine.is_loaded(Language::Go));
    assert!(!engine.is_loaded(Language::Swift));

    let facts = codefacts::analyze("class Greeter:\n    pass\n", Language::Python).unwrap();
    assert_eq!(facts.classes, vec!["Greeter"]);
}
