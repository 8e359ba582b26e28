//! Single-pass fact extraction.
//!
//! One high-model call resolves pronouns and owners, extracts new atomic
//! facts, proposes search keywords and names the subject the user is asking
//! about.

use super::completion::ValidatedCompletion;
use crate::generation::TextGeneration;
use crate::session::tail;
use crate::types::{AtomicFact, Topic};
use chrono::Local;
use openrouter::Message;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const LABEL: &str = "Sensory Analysis";

/// Characters of history shown to the analyzer.
pub const ANALYSIS_HISTORY_CHARS: usize = 600;

/// What the analyzer learned from one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// New facts, in the order the model emitted them.
    pub entries: Vec<AtomicFact>,
    pub search_keywords: Vec<String>,
    pub query_subject: String,
}

impl Analysis {
    /// The result used when analysis fails.
    pub fn empty(identity: &str) -> Self {
        Self {
            entries: Vec::new(),
            search_keywords: Vec::new(),
            query_subject: identity.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    #[serde(default)]
    entries: Option<Vec<Value>>,
    #[serde(default)]
    search_keywords: Option<Vec<Value>>,
    #[serde(default)]
    query_subject: Option<Value>,
}

pub struct FactAnalyzer<G: ?Sized> {
    completion: ValidatedCompletion<G>,
    identity: String,
}

impl<G> FactAnalyzer<G>
where
    G: TextGeneration + ?Sized,
{
    pub fn new(completion: ValidatedCompletion<G>, identity: impl Into<String>) -> Self {
        Self {
            completion,
            identity: identity.into(),
        }
    }

    /// Analyze an utterance against recent history and relationship context.
    pub async fn analyze(
        &self,
        utterance: &str,
        history_text: &str,
        relationship_context: &str,
        model: &str,
        credential: &str,
    ) -> Analysis {
        let today = Local::now().format("%b %-d, %Y").to_string();
        let prompt = analysis_prompt(
            &self.identity,
            &today,
            tail(history_text, ANALYSIS_HISTORY_CHARS),
            relationship_context,
            utterance,
        );

        let payload = match self
            .completion
            .complete::<AnalysisPayload, _>(
                &[Message::system(prompt)],
                model,
                credential,
                |p| p.entries.is_some(),
                LABEL,
            )
            .await
        {
            Ok(completion) => completion.parsed,
            Err(e) => {
                warn!(error = %e, "analysis failed, continuing without facts");
                return Analysis::empty(&self.identity);
            }
        };

        let analysis = self.normalize(payload);
        info!(
            facts = analysis.entries.len(),
            keywords = analysis.search_keywords.len(),
            subject = %analysis.query_subject,
            "utterance analyzed"
        );
        analysis
    }

    fn normalize(&self, payload: AnalysisPayload) -> Analysis {
        let entries = payload
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<AtomicFact>(entry) {
                Ok(fact) if !fact.fact.trim().is_empty() => Some(fact),
                Ok(_) => {
                    debug!("dropping entry with a blank fact");
                    None
                }
                Err(e) => {
                    debug!(error = %e, "dropping unusable entry");
                    None
                }
            })
            .map(|mut fact| {
                if fact.owner.trim().is_empty() {
                    fact.owner = self.identity.clone();
                }
                fact
            })
            .collect();

        let search_keywords = payload
            .search_keywords
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();

        let query_subject = payload
            .query_subject
            .as_ref()
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.identity.clone());

        Analysis {
            entries,
            search_keywords,
            query_subject,
        }
    }
}

fn analysis_prompt(
    identity: &str,
    today: &str,
    history: &str,
    relationships: &str,
    utterance: &str,
) -> String {
    let topics = Topic::ALL.map(|t| t.as_str()).join(", ");

    format!(
        r#"USER_IDENTITY: {identity}. (Assume "I" and "me" refer to {identity}.)
CURRENT_DATE: {today}
HISTORY_CONTEXT: {history}
RELATIONSHIP_DB: {relationships}
INPUT: "{utterance}"

TASK: Hybrid Analysis
1. CONTEXTUAL RESOLUTION:
   - Resolve pronouns (he/she/it) using HISTORY_CONTEXT.
   - Resolve owners using RELATIONSHIP_DB. If INPUT is "Dad hates spinach" and the
     DB says "Ferdy is {identity}'s father", the OWNER is "Ferdy".
   - If the DB is empty, describe the person relative to {identity} (e.g. "{identity}'s Father").

2. ATOMIC ENTRIES: Extract new facts to store.
   - If the user gives a date or detail (e.g. "In 2022") answering a previous question,
     COMBINE it with the context into a full fact.
   - Compare INPUT against HISTORY_CONTEXT and RELATIONSHIP_DB. If a fact is ALREADY KNOWN,
     do not extract it. Only extract information that is NEW, UPDATED or CONTRADICTORY.
   - Ignore questions and commands.
   - OWNER: the subject of the fact (use the real name if the DB has one).
   - IMPORTANCE: 1-10.
   - TYPE: one of
     * "Bio" (permanent traits, history, relationships, likes/dislikes)
     * "Psych" (inner thoughts, fears, mental state, personality)
     * "Status" (temporary state, current location, current activity)
     * "Log" (general events or trivial actions)
   - TOPICS: one of [{topics}].
   - TEMPORAL AMBIGUITY: set "ambiguous": true if a specific past event is mentioned without a date.

3. SEARCH KEYWORDS: database search terms.
   - Include ALL relevant topics from the list above (more than one) and any named people.
     "How was my relationship with Dad?" -> ["Relationship", "History", "Ferdy"]
     "Where did I work?" -> ["Work", "History", "Location"]

4. QUERY SUBJECT: who is the user asking about?
   - "Who is Brandon?" -> "Brandon"
   - "I am happy" -> "{identity}"
   - Default to "{identity}".

Respond with ONLY a JSON object:
{{
  "entries": [
    {{ "fact": "...", "importance": 8, "owner": "...", "type": "...", "topics": "...", "ambiguous": false }}
  ],
  "search_keywords": ["Preference", "Food"],
  "query_subject": "..."
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use crate::types::FactType;
    use std::sync::Arc;
    use std::time::Duration;

    fn analyzer(generator: &Arc<ScriptedGenerator>) -> FactAnalyzer<ScriptedGenerator> {
        FactAnalyzer::new(
            ValidatedCompletion::new(Arc::clone(generator), Duration::from_secs(5)),
            "Arvin",
        )
    }

    #[tokio::test]
    async fn test_parses_entries_keywords_and_subject() {
        let generator = Arc::new(ScriptedGenerator::new().reply(
            r#"Sure! {"entries": [{"fact": "Ferdy is eating spinach", "importance": 3,
                "owner": "Ferdy", "type": "Status", "topics": "Health", "ambiguous": false}],
                "search_keywords": ["Preference", "Health"], "query_subject": "Ferdy"}"#,
        ));

        let analysis = analyzer(&generator)
            .analyze("My dad is eating spinach", "", "", "high", "key")
            .await;

        assert_eq!(analysis.entries.len(), 1);
        assert_eq!(analysis.entries[0].owner, "Ferdy");
        assert_eq!(analysis.entries[0].kind, FactType::Status);
        assert_eq!(analysis.search_keywords, vec!["Preference", "Health"]);
        assert_eq!(analysis.query_subject, "Ferdy");
    }

    #[tokio::test]
    async fn test_defaults_owner_and_subject_to_identity() {
        let generator = Arc::new(ScriptedGenerator::new().reply(
            r#"{"entries": [{"fact": "Feels tired", "importance": 4, "owner": " "}], "query_subject": ""}"#,
        ));

        let analysis = analyzer(&generator).analyze("I'm tired", "", "", "high", "key").await;

        assert_eq!(analysis.entries[0].owner, "Arvin");
        assert_eq!(analysis.query_subject, "Arvin");
        assert!(analysis.search_keywords.is_empty());
    }

    #[tokio::test]
    async fn test_keeps_good_entries_next_to_bad_ones() {
        let generator = Arc::new(ScriptedGenerator::new().reply(
            r#"{"entries": [
                {"fact": "Arvin broke his arm", "importance": 8, "owner": "Arvin",
                 "type": "Bio", "topics": ["Health", "History"], "ambiguous": true},
                {"fact": "Arvin likes tea", "importance": 5, "topics": null, "ambiguous": null},
                {"fact": "Unrated", "importance": "lots"},
                {"importance": 4},
                {"fact": "  ", "importance": 4},
                "stray"
              ],
              "search_keywords": ["Health", null], "query_subject": "Arvin"}"#,
        ));

        let analysis = analyzer(&generator)
            .analyze("I broke my arm, and I like tea", "", "", "high", "key")
            .await;

        assert_eq!(generator.call_count(), 1);
        assert_eq!(analysis.entries.len(), 2);
        assert_eq!(analysis.entries[0].topics, Topic::Health);
        assert_eq!(analysis.entries[0].importance, 8);
        assert!(analysis.entries[0].ambiguous);
        assert_eq!(analysis.entries[1].topics, Topic::Trivial);
        assert_eq!(analysis.entries[1].owner, "Arvin");
        assert!(!analysis.entries[1].ambiguous);
        assert_eq!(analysis.search_keywords, vec!["Health"]);
    }

    #[tokio::test]
    async fn test_missing_entries_degrades_to_empty() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .reply(r#"{"search_keywords": ["Work"]}"#)
                .reply(r#"{"entries": "none"}"#),
        );

        let analysis = analyzer(&generator).analyze("hello", "", "", "high", "key").await;

        assert_eq!(analysis, Analysis::empty("Arvin"));
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_prompt_carries_context() {
        let generator = Arc::new(ScriptedGenerator::new().reply(r#"{"entries": []}"#));
        let history = format!("USER: {}\nASSISTANT: latest words", "x".repeat(1000));

        analyzer(&generator)
            .analyze(
                "My dad is eating spinach",
                &history,
                "KNOWN RELATIONSHIPS:\nFerdy is Arvin's father",
                "high",
                "key",
            )
            .await;

        let prompt = generator.calls()[0].prompt();
        assert!(prompt.contains("USER_IDENTITY: Arvin."));
        assert!(prompt.contains("Ferdy is Arvin's father"));
        assert!(prompt.contains("INPUT: \"My dad is eating spinach\""));
        assert!(prompt.contains("ASSISTANT: latest words"));
        assert!(!prompt.contains(&"x".repeat(600)));
    }
}
