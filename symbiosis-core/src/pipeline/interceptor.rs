//! Clarifying questions for undated significant events.

use super::completion::{CompletionError, ValidatedCompletion};
use crate::generation::TextGeneration;
use crate::types::{AtomicFact, MoodTree};
use openrouter::Message;
use tracing::warn;

const LABEL: &str = "Interceptor";

/// Facts at or above this importance are worth a follow-up question.
pub const MIN_INTERCEPT_IMPORTANCE: u8 = 6;

/// The first significant fact that lacks a date, in emission order.
pub fn first_unclear(entries: &[AtomicFact]) -> Option<&AtomicFact> {
    entries
        .iter()
        .find(|fact| fact.importance >= MIN_INTERCEPT_IMPORTANCE && fact.ambiguous)
}

pub struct AmbiguityInterceptor<G: ?Sized> {
    completion: ValidatedCompletion<G>,
}

impl<G> AmbiguityInterceptor<G>
where
    G: TextGeneration + ?Sized,
{
    pub fn new(completion: ValidatedCompletion<G>) -> Self {
        Self { completion }
    }

    /// Ask about the first unclear fact, or return `None` when there is none.
    pub async fn intercept(
        &self,
        entries: &[AtomicFact],
        utterance: &str,
        model: &str,
        credential: &str,
    ) -> Option<Result<MoodTree, CompletionError>> {
        let unclear = first_unclear(entries)?;
        warn!(fact = %unclear.fact, importance = unclear.importance, "interceptor triggered: missing date");
        Some(self.ask(unclear, utterance, model, credential).await)
    }

    async fn ask(
        &self,
        unclear: &AtomicFact,
        utterance: &str,
        model: &str,
        credential: &str,
    ) -> Result<MoodTree, CompletionError> {
        let prompt = format!(
            r#"User said: "{utterance}"
Fact: "{fact}"
ISSUE: A significant event is missing its date.
INSTRUCTIONS: Ask "When did this happen?" naturally, in character.
VALID MOODS: [CURIOUS, CONCERNED]

Respond with ONLY a JSON object:
{{ "response": "...", "mood": "CURIOUS", "roots": [] }}"#,
            fact = unclear.fact,
        );

        let completion = self
            .completion
            .complete::<MoodTree, _>(
                &[Message::system(prompt)],
                model,
                credential,
                |tree| !tree.response.trim().is_empty(),
                LABEL,
            )
            .await?;

        let mut tree = completion.parsed;
        tree.roots.clear();
        Ok(tree)
    }
}
