//! Final reply generation.

use super::completion::{Completion, CompletionError, ValidatedCompletion};
use crate::generation::TextGeneration;
use crate::session::tail;
use crate::types::{Mood, MoodTree, MAX_BRANCHES, MAX_LEAVES, MAX_ROOTS};
use openrouter::Message;
use tracing::debug;

const LABEL: &str = "Generation";

/// Characters of history shown to the reply generator.
pub const RESPONSE_HISTORY_CHARS: usize = 800;

/// Tone of the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyMode {
    #[default]
    Companion,
    Interrogation,
}

impl ReplyMode {
    pub fn from_question_mode(question_mode: bool) -> Self {
        if question_mode {
            ReplyMode::Interrogation
        } else {
            ReplyMode::Companion
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            ReplyMode::Companion => "MODE: COMPANION.",
            ReplyMode::Interrogation => "MODE: INTERROGATION.",
        }
    }
}

pub struct ResponseGenerator<G: ?Sized> {
    completion: ValidatedCompletion<G>,
}

impl<G> ResponseGenerator<G>
where
    G: TextGeneration + ?Sized,
{
    pub fn new(completion: ValidatedCompletion<G>) -> Self {
        Self { completion }
    }

    /// Produce the reply and its mood tree.
    ///
    /// Only the presence of `response` and `mood` is checked; the tree's
    /// shape is left to the model and merely logged.
    pub async fn generate(
        &self,
        mode: ReplyMode,
        retrieved_context: &str,
        history_text: &str,
        utterance: &str,
        model: &str,
        credential: &str,
    ) -> Result<Completion<MoodTree>, CompletionError> {
        let prompt = response_prompt(
            mode,
            retrieved_context,
            tail(history_text, RESPONSE_HISTORY_CHARS),
            utterance,
        );

        let completion = self
            .completion
            .complete::<MoodTree, _>(&[Message::user(prompt)], model, credential, MoodTree::has_reply, LABEL)
            .await?;

        debug!(
            well_formed = completion.parsed.is_well_formed(),
            roots = completion.parsed.roots.len(),
            "reply generated"
        );
        Ok(completion)
    }
}

fn response_prompt(mode: ReplyMode, context: &str, history: &str, utterance: &str) -> String {
    let moods = Mood::REPLY_MOODS.map(|m| m.as_str()).join(", ");

    format!(
        r#"{mode}

DATABASE RESULTS:
{context}

HISTORY:
{history}

User: "{utterance}"

### TASK ###
1. ANALYZE the database results and history.
2. RESPOND to the user naturally, in character.
   - Do NOT talk about "compiling data", "JSON" or "processing". Just talk.
   - If you found information, weave it into the conversation (e.g. "I remember you dated Suwandi...").
   - If the user asks a question, answer it directly.

MOOD TREE:
- ROOTS: at most {MAX_ROOTS} objects. Each ROOT LABEL is exactly 1 UPPERCASE word.
- BRANCHES: at most {MAX_BRANCHES} per root. Each label is exactly 1 UPPERCASE word.
- LEAVES: at most {MAX_LEAVES} per branch. Each leaf is exactly 1 UPPERCASE word.

CRITICAL INSTRUCTIONS:
1. DO NOT USE PHRASES. SINGLE WORDS ONLY for labels.
2. ASSIGN MOODS: every ROOT and BRANCH gets the mood matching its sentiment.
   - A branch "SPINACH" the user hates gets "HATE".
   - A branch "MUSIC" the user loves gets "JOYFUL".

MOODS: [{moods}]

Respond with ONLY a JSON object:
{{
  "response": "...",
  "mood": "GLOBAL_MOOD",
  "roots": [
    {{
      "label": "ROOT_WORD",
      "mood": "SPECIFIC_MOOD",
      "branches": [
        {{ "label": "BRANCH_WORD", "mood": "SPECIFIC_MOOD", "leaves": ["LEAF1", "LEAF2"] }}
      ]
    }}
  ]
}}"#,
        mode = mode.instruction(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use openrouter::Role;
    use std::sync::Arc;
    use std::time::Duration;

    fn generator_for(script: &Arc<ScriptedGenerator>) -> ResponseGenerator<ScriptedGenerator> {
        ResponseGenerator::new(ValidatedCompletion::new(Arc::clone(script), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_generates_reply_as_single_user_message() {
        let script = Arc::new(ScriptedGenerator::new().reply(
            r#"{"response": "Spinach again?", "mood": "HATE", "roots": [{"label": "FOOD", "mood": "HATE", "branches": []}]}"#,
        ));

        let completion = generator_for(&script)
            .generate(ReplyMode::Interrogation, "=== CONTEXT ===", "USER: hi", "Dad eats spinach", "high", "key")
            .await
            .unwrap();

        assert_eq!(completion.parsed.response, "Spinach again?");
        assert_eq!(completion.parsed.mood, Some(Mood::Hate));

        let call = &script.calls()[0];
        assert_eq!(call.messages.len(), 1);
        assert_eq!(call.messages[0].role, Role::User);
        assert!(call.messages[0].content.starts_with("MODE: INTERROGATION."));
        assert!(call.messages[0].content.contains("=== CONTEXT ==="));
    }

    #[tokio::test]
    async fn test_missing_mood_is_rejected() {
        let script = Arc::new(
            ScriptedGenerator::new()
                .reply(r#"{"response": "Hi"}"#)
                .reply(r#"{"response": "", "mood": "JOYFUL"}"#),
        );

        let result = generator_for(&script)
            .generate(ReplyMode::Companion, "", "", "hello", "high", "key")
            .await;

        assert!(result.is_err());
        assert_eq!(script.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_tree_is_still_accepted() {
        let script = Arc::new(ScriptedGenerator::new().reply(
            r#"{"response": "Hello!", "mood": "joyful", "roots": [
                {"label": "good times", "mood": "JOYFUL"}, {"label": "A"}, {"label": "B"}, {"label": "C"}]}"#,
        ));

        let completion = generator_for(&script)
            .generate(ReplyMode::Companion, "", "", "hello", "high", "key")
            .await
            .unwrap();

        assert!(!completion.parsed.is_well_formed());
        assert_eq!(completion.parsed.roots.len(), 4);
    }

    #[test]
    fn test_mode_line() {
        assert!(response_prompt(ReplyMode::Companion, "", "", "hi").starts_with("MODE: COMPANION."));
        assert_eq!(ReplyMode::from_question_mode(true), ReplyMode::Interrogation);
    }
}
