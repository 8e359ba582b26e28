//! Integration tests that call the real OpenRouter API.
//!
//! These tests require OPENROUTER_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p symbiosis-core --test api_integration -- --ignored`
//!
//! The memory store is replaced by `InMemoryStore`, so only model calls
//! leave the machine.

use std::sync::Arc;
use std::time::Duration;
use symbiosis_core::pipeline::analyzer::FactAnalyzer;
use symbiosis_core::pipeline::relationship::RelationshipResolver;
use symbiosis_core::{
    InMemoryStore, Pipeline, PipelineConfig, RetrieveResult, Session, SymbiosisConfig, TurnRequest,
    ValidatedCompletion,
};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// The API key, if one is available
fn api_key() -> Option<String> {
    std::env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty())
}

fn models() -> (String, String) {
    let defaults = SymbiosisConfig::default().generation;
    (defaults.high_model, defaults.low_model)
}

fn completion() -> ValidatedCompletion<openrouter::OpenRouter> {
    ValidatedCompletion::new(
        Arc::new(openrouter::OpenRouter::with_timeout(Duration::from_secs(60)).unwrap()),
        Duration::from_secs(60),
    )
}

#[tokio::test]
#[ignore] // Run with: cargo test -p symbiosis-core --test api_integration -- --ignored
async fn test_relationship_expansion_finds_father() {
    setup();
    let Some(key) = api_key() else {
        eprintln!("Skipping test: OPENROUTER_API_KEY not set");
        return;
    };
    let (_, low) = models();

    let store = Arc::new(
        InMemoryStore::new().with_result(RetrieveResult::found(vec!["Ferdy is Arvin's father".to_string()])),
    );
    let resolver = RelationshipResolver::new(completion(), Arc::clone(&store), "Arvin");

    let context = resolver.resolve("My dad is eating spinach", &low, &key).await;

    let searches = store.searches();
    assert_eq!(searches.len(), 1, "model should name at least one person");
    let keywords: Vec<String> = searches[0].keywords.iter().map(|k| k.to_lowercase()).collect();
    assert!(keywords.iter().any(|k| k == "dad" || k == "father"));
    assert!(context.contains("Ferdy is Arvin's father"));
}

#[tokio::test]
#[ignore]
async fn test_analyzer_resolves_owner_from_relationships() {
    setup();
    let Some(key) = api_key() else {
        eprintln!("Skipping test: OPENROUTER_API_KEY not set");
        return;
    };
    let (high, _) = models();

    let analyzer = FactAnalyzer::new(completion(), "Arvin");
    let analysis = analyzer
        .analyze(
            "My dad is eating spinach",
            "",
            "KNOWN RELATIONSHIPS:\nFerdy is Arvin's father",
            &high,
            &key,
        )
        .await;

    println!("Analysis: {analysis:?}");
    assert!(!analysis.entries.is_empty(), "should extract the spinach fact");
    assert_eq!(analysis.entries[0].owner, "Ferdy");
}

#[tokio::test]
#[ignore]
async fn test_full_turn_returns_mood_tree() {
    setup();
    let Some(key) = api_key() else {
        eprintln!("Skipping test: OPENROUTER_API_KEY not set");
        return;
    };
    let (high, low) = models();

    let generator = Arc::new(openrouter::OpenRouter::with_timeout(Duration::from_secs(60)).unwrap());
    let store = Arc::new(InMemoryStore::new());
    let pipeline = Pipeline::new(generator, Arc::clone(&store), PipelineConfig::default());
    let mut session = Session::new();

    let reply = pipeline
        .process_turn(
            &mut session,
            &TurnRequest::new("I just started learning the guitar today!", key).with_models(high, low),
        )
        .await
        .expect("turn should succeed");
    pipeline.flush().await;

    println!("Reply: {}", reply.raw);
    assert!(reply.tree.has_reply());
    assert_eq!(session.history().len(), 2);
    assert_eq!(store.logged().len(), 2);
}
