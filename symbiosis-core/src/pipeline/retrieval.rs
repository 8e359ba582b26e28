//! Memory retrieval.
//!
//! Search keywords come from four places, in this order:
//!
//! 1. the analyzer's suggested keywords
//! 2. up to two "sticky" words from the last assistant turn
//! 3. subject names found in the relationship context
//! 4. words from the raw utterance, only when 1-3 produced nothing
//!
//! The resulting [`SearchRequest`] is sent once; a hit becomes the context
//! block the reply generator reads.

use crate::store::{MemoryStore, RetrieveResult};
use crate::types::{AtomicFact, ChatRole, ChatTurn, SearchRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// Sticky words taken from the last assistant turn.
pub const MAX_STICKY_WORDS: usize = 2;

const FALLBACK_STOPWORDS: [&str; 6] = ["what", "when", "where", "show", "list", "give"];

static SUBJECT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[Subject:\s*([^\]]+)\]").expect("valid subject regex"));

/// Everything the retriever needs from earlier stages.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalInput<'a> {
    pub utterance: &'a str,
    pub history: &'a [ChatTurn],
    pub relationship_context: &'a str,
    pub search_keywords: &'a [String],
    pub entries: &'a [AtomicFact],
    pub query_subject: &'a str,
}

/// The query that was sent and the context it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub request: SearchRequest,
    /// Empty when nothing was found or the store failed.
    pub context: String,
}

pub struct MemoryRetriever<S: ?Sized> {
    store: Arc<S>,
    identity: String,
}

impl<S> MemoryRetriever<S>
where
    S: MemoryStore + ?Sized,
{
    pub fn new(store: Arc<S>, identity: impl Into<String>) -> Self {
        Self {
            store,
            identity: identity.into(),
        }
    }

    /// Build the search, run it, and assemble the context block.
    pub async fn retrieve(&self, input: RetrievalInput<'_>) -> Retrieval {
        let request = SearchRequest {
            owner: primary_owner(input.entries, input.query_subject),
            keywords: aggregate_keywords(&input, &self.identity),
        };
        info!(owner = %request.owner, keywords = ?request.keywords, "searching memory");

        let context = match self.store.retrieve(&request).await {
            Ok(result) if result.found => assemble_context(&request.owner, &result),
            Ok(_) => String::new(),
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                String::new()
            }
        };

        Retrieval { request, context }
    }
}

/// The owner of the first extracted fact, else the query subject.
pub fn primary_owner(entries: &[AtomicFact], query_subject: &str) -> String {
    entries
        .first()
        .map(|fact| fact.owner.trim())
        .filter(|owner| !owner.is_empty())
        .unwrap_or(query_subject)
        .to_string()
}

/// Collect search keywords, first occurrence wins.
pub fn aggregate_keywords(input: &RetrievalInput<'_>, identity: &str) -> Vec<String> {
    let mut keywords = Keywords::default();

    keywords.extend(input.search_keywords.iter().cloned());
    keywords.extend(sticky_words(input.history));
    keywords.extend(subject_names(input.relationship_context, identity));

    if keywords.is_empty() {
        keywords.extend(fallback_words(input.utterance));
    }

    keywords.0
}

#[derive(Default)]
struct Keywords(Vec<String>);

impl Keywords {
    fn extend(&mut self, words: impl IntoIterator<Item = String>) {
        for word in words {
            if !word.trim().is_empty() && !self.0.contains(&word) {
                self.0.push(word);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Long alphabetic words from the most recent assistant turn.
pub fn sticky_words(history: &[ChatTurn]) -> Vec<String> {
    let Some(last) = history.iter().rev().find(|turn| turn.role == ChatRole::Assistant) else {
        return Vec::new();
    };

    last.content
        .split(' ')
        .filter(|word| word.len() > 5 && word.chars().all(|c| c.is_ascii_alphabetic()))
        .take(MAX_STICKY_WORDS)
        .map(str::to_string)
        .collect()
}

/// Names from `[Subject: ...]` markers, excluding `identity` and short names.
pub fn subject_names(context: &str, identity: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in SUBJECT_MARKER.captures_iter(context) {
        let name = capture[1].trim();
        if name != identity && name.chars().count() > 2 && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Lower-cased letters-only words of the utterance, minus stopwords.
pub fn fallback_words(utterance: &str) -> Vec<String> {
    utterance
        .split(' ')
        .map(|word| {
            word.chars()
                .filter(char::is_ascii_alphabetic)
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|word| word.len() > 3 && !FALLBACK_STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Render a positive search result for the reply prompt.
pub fn assemble_context(owner: &str, result: &RetrieveResult) -> String {
    let persona = result.persona.clone().unwrap_or_default();
    format!(
        "=== SUBJECT CONTEXT ({owner}) ===\n[BIO]: {bio}\n[STATUS]: {status}\n\n\
         === DATABASE SEARCH RESULTS (GLOBAL) ===\n{memories}",
        owner = owner.to_uppercase(),
        bio = persona.bio,
        status = persona.current_status,
        memories = result.relevant_memories.join("\n"),
    )
}
