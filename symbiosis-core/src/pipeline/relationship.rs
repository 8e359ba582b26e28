//! Relationship resolution.
//!
//! Expands references to people into synonym sets ("dad" becomes dad,
//! father, parent) with a cheap model, then pulls whatever the store already
//! knows about them.

use super::completion::ValidatedCompletion;
use crate::generation::TextGeneration;
use crate::store::MemoryStore;
use crate::types::SearchRequest;
use openrouter::Message;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const LABEL: &str = "Rel Check";

/// Header of the relationship context block.
pub const RELATIONSHIPS_HEADER: &str = "KNOWN RELATIONSHIPS:";

#[derive(Debug, Deserialize)]
struct Expansion {
    #[serde(default)]
    keywords: Option<Vec<String>>,
}

/// Looks up known relationships for the people an utterance mentions.
pub struct RelationshipResolver<G: ?Sized, S: ?Sized> {
    completion: ValidatedCompletion<G>,
    store: Arc<S>,
    identity: String,
}

impl<G, S> RelationshipResolver<G, S>
where
    G: TextGeneration + ?Sized,
    S: MemoryStore + ?Sized,
{
    pub fn new(completion: ValidatedCompletion<G>, store: Arc<S>, identity: impl Into<String>) -> Self {
        Self {
            completion,
            store,
            identity: identity.into(),
        }
    }

    /// Return the relationship context block, or an empty string.
    ///
    /// Never fails: every error along the way degrades to "no context".
    pub async fn resolve(&self, utterance: &str, model: &str, credential: &str) -> String {
        let messages = [Message::system(relationship_prompt(utterance))];

        let expansion = match self
            .completion
            .complete::<Expansion, _>(&messages, model, credential, |e| e.keywords.is_some(), LABEL)
            .await
        {
            Ok(completion) => completion.parsed,
            Err(e) => {
                warn!(error = %e, "relationship check skipped");
                return String::new();
            }
        };

        let keywords = expansion.keywords.unwrap_or_default();
        if keywords.is_empty() {
            debug!("no people mentioned");
            return String::new();
        }
        info!(?keywords, "expanded relationship keywords");

        let request = SearchRequest {
            owner: self.identity.clone(),
            keywords,
        };

        match self.store.retrieve(&request).await {
            Ok(result) if result.found && !result.relevant_memories.is_empty() => {
                info!(matches = result.relevant_memories.len(), "relationship context found");
                format!("{RELATIONSHIPS_HEADER}\n{}", result.relevant_memories.join("\n"))
            }
            Ok(_) => String::new(),
            Err(e) => {
                warn!(error = %e, "relationship lookup failed");
                String::new()
            }
        }
    }
}

fn relationship_prompt(utterance: &str) -> String {
    format!(
        r#"INPUT: "{utterance}"
TASK: Identify if the user mentions any PEOPLE or RELATIONSHIPS.
If found, return the word AND its formal synonyms.

EXAMPLES:
Input: "My dad is eating" -> Output: ["dad", "father", "parent"]
Input: "I hate spinach" -> Output: []
Input: "Ferdy is here" -> Output: ["Ferdy"]

Respond with ONLY a JSON object:
{{ "keywords": [...] }}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RetrieveResult;
    use crate::testing::{InMemoryStore, ScriptedGenerator};
    use std::time::Duration;

    fn build_resolver(
        generator: ScriptedGenerator,
        store: InMemoryStore,
    ) -> (RelationshipResolver<ScriptedGenerator, InMemoryStore>, Arc<InMemoryStore>) {
        let store = Arc::new(store);
        let completion = ValidatedCompletion::new(Arc::new(generator), Duration::from_secs(5));
        (RelationshipResolver::new(completion, Arc::clone(&store), "Arvin"), store)
    }

    #[tokio::test]
    async fn test_builds_relationship_block() {
        let (resolver, store) = build_resolver(
            ScriptedGenerator::new().reply(r#"{"keywords": ["dad", "father", "parent"]}"#),
            InMemoryStore::new().with_result(RetrieveResult::found(vec![
                "[Subject: Ferdy] Ferdy is Arvin's father".to_string(),
            ])),
        );

        let context = resolver.resolve("My dad is eating spinach", "low", "key").await;

        assert_eq!(context, "KNOWN RELATIONSHIPS:\n[Subject: Ferdy] Ferdy is Arvin's father");
        let searches = store.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].owner, "Arvin");
        assert_eq!(searches[0].keywords, vec!["dad", "father", "parent"]);
    }

    #[tokio::test]
    async fn test_empty_keywords_skip_the_store() {
        let (resolver, store) = build_resolver(
            ScriptedGenerator::new().reply(r#"{"keywords": []}"#),
            InMemoryStore::new(),
        );

        assert_eq!(resolver.resolve("I hate spinach", "low", "key").await, "");
        assert!(store.searches().is_empty());
    }

    #[tokio::test]
    async fn test_failures_degrade_to_empty_context() {
        let (resolver, _) = build_resolver(ScriptedGenerator::new(), InMemoryStore::new());
        assert_eq!(resolver.resolve("My dad", "low", "key").await, "");

        let (resolver, _) = build_resolver(
            ScriptedGenerator::new().reply(r#"{"keywords": ["dad"]}"#),
            InMemoryStore::new().failing_reads(),
        );
        assert_eq!(resolver.resolve("My dad", "low", "key").await, "");

        let (resolver, _) = build_resolver(
            ScriptedGenerator::new().reply(r#"{"keywords": ["dad"]}"#),
            InMemoryStore::new().with_result(RetrieveResult::found(Vec::new())),
        );
        assert_eq!(resolver.resolve("My dad", "low", "key").await, "");
    }
}
