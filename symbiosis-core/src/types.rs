//! Data model shared by every pipeline stage.
//!
//! Closed vocabularies (fact type, topic, mood) are enums that deserialize
//! leniently: the model is asked for exact words, but an unknown word is
//! coerced to a neutral default instead of failing the whole payload.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    /// Parse a stored role name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            "system" => Some(ChatRole::System),
            _ => None,
        }
    }

    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Durability class of an extracted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum FactType {
    /// Permanent traits, history, relationships, likes and dislikes.
    Bio,
    /// Inner thoughts, fears, mental state, personality.
    Psych,
    /// Temporary state, current location, current activity.
    Status,
    /// General events or trivial actions.
    #[default]
    Log,
}

impl FactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Bio => "Bio",
            FactType::Psych => "Psych",
            FactType::Status => "Status",
            FactType::Log => "Log",
        }
    }
}

impl From<String> for FactType {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bio" => FactType::Bio,
            "psych" => FactType::Psych,
            "status" => FactType::Status,
            "log" => FactType::Log,
            other => {
                tracing::debug!(value = other, "unknown fact type, using Log");
                FactType::Log
            }
        }
    }
}

/// Topic category of an extracted fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Topic {
    Identity,
    Preference,
    Location,
    Relationship,
    History,
    Work,
    Dream,
    Health,
    #[default]
    Trivial,
}

impl Topic {
    /// Every topic, in prompt order.
    pub const ALL: [Topic; 9] = [
        Topic::Identity,
        Topic::Preference,
        Topic::Location,
        Topic::Relationship,
        Topic::History,
        Topic::Work,
        Topic::Dream,
        Topic::Health,
        Topic::Trivial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Identity => "Identity",
            Topic::Preference => "Preference",
            Topic::Location => "Location",
            Topic::Relationship => "Relationship",
            Topic::History => "History",
            Topic::Work => "Work",
            Topic::Dream => "Dream",
            Topic::Health => "Health",
            Topic::Trivial => "Trivial",
        }
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        let wanted = s.trim();
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .unwrap_or_else(|| {
                tracing::debug!(value = wanted, "unknown topic, using Trivial");
                Topic::Trivial
            })
    }
}

/// A single classified piece of information about a person.
///
/// Only `fact` and `importance` are required; every other field falls back
/// to its default when it is missing, null or of the wrong shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicFact {
    pub fact: String,
    #[serde(deserialize_with = "lenient_importance")]
    pub importance: u8,
    #[serde(default, deserialize_with = "lenient")]
    pub owner: String,
    #[serde(rename = "type", default, deserialize_with = "lenient_word")]
    pub kind: FactType,
    #[serde(default, deserialize_with = "lenient_word")]
    pub topics: Topic,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub ambiguous: bool,
}

impl AtomicFact {
    /// Create a fact with the default classification.
    pub fn new(fact: impl Into<String>, importance: u8, owner: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            importance: importance.clamp(1, 10),
            owner: owner.into(),
            kind: FactType::default(),
            topics: Topic::default(),
            ambiguous: false,
        }
    }

    pub fn with_kind(mut self, kind: FactType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topics = topic;
        self
    }

    pub fn ambiguous(mut self, ambiguous: bool) -> Self {
        self.ambiguous = ambiguous;
        self
    }
}

/// Decode a field, falling back to its default when the value is null or
/// has the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Decode a sequence, dropping elements that do not decode.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// A vocabulary word given as a string, or as a list whose first string
/// wins. Anything else is the default.
fn lenient_word<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: From<String> + Default,
{
    let word = match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().find_map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        }),
        _ => None,
    };
    Ok(word.map(T::from).unwrap_or_default())
}

/// `true`, `"true"` or a non-zero number; anything else is false.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// Accept `8`, `8.0` or `"8"`, rounded and clamped to 1..=10.
fn lenient_importance<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(n.round().clamp(1.0, 10.0) as u8),
        _ => Err(de::Error::custom(format!("invalid importance: {value}"))),
    }
}

/// One memory-store query, built once per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub owner: String,
    pub keywords: Vec<String>,
}

/// Sentiment attached to a reply or to a node of its mood tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", rename_all = "UPPERCASE")]
pub enum Mood {
    #[default]
    Neutral,
    Affectionate,
    Cryptic,
    Hate,
    Joyful,
    Curious,
    Sad,
    Question,
    /// Only offered to the clarifying-question branch.
    Concerned,
}

impl Mood {
    /// Moods offered to the reply generator.
    pub const REPLY_MOODS: [Mood; 8] = [
        Mood::Neutral,
        Mood::Affectionate,
        Mood::Cryptic,
        Mood::Hate,
        Mood::Joyful,
        Mood::Curious,
        Mood::Sad,
        Mood::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "NEUTRAL",
            Mood::Affectionate => "AFFECTIONATE",
            Mood::Cryptic => "CRYPTIC",
            Mood::Hate => "HATE",
            Mood::Joyful => "JOYFUL",
            Mood::Curious => "CURIOUS",
            Mood::Sad => "SAD",
            Mood::Question => "QUESTION",
            Mood::Concerned => "CONCERNED",
        }
    }
}

impl From<String> for Mood {
    fn from(s: String) -> Self {
        let wanted = s.trim();
        Mood::REPLY_MOODS
            .into_iter()
            .chain([Mood::Concerned])
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .unwrap_or_else(|| {
                tracing::debug!(value = wanted, "unknown mood, using NEUTRAL");
                Mood::Neutral
            })
    }
}

/// Missing, null, blank or non-string moods become `None`; any other word
/// is coerced.
fn present_mood<'de, D>(deserializer: D) -> Result<Option<Mood>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(Some(Mood::from(s))),
        _ => Ok(None),
    }
}

/// A generated reply together with its sentiment tree.
///
/// Only `response` and `mood` decide whether a reply is usable, so every
/// nested node decodes leniently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoodTree {
    #[serde(default, deserialize_with = "lenient")]
    pub response: String,
    #[serde(default, deserialize_with = "present_mood")]
    pub mood: Option<Mood>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub roots: Vec<Root>,
}

/// Top level of a mood tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Root {
    #[serde(default, deserialize_with = "lenient")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_word")]
    pub mood: Mood,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub branches: Vec<Branch>,
}

/// Second level of a mood tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default, deserialize_with = "lenient")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_word")]
    pub mood: Mood,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub leaves: Vec<String>,
}

pub const MAX_ROOTS: usize = 3;
pub const MAX_BRANCHES: usize = 5;
pub const MAX_LEAVES: usize = 5;

impl MoodTree {
    /// A reply has both a non-blank response and a mood.
    pub fn has_reply(&self) -> bool {
        !self.response.trim().is_empty() && self.mood.is_some()
    }

    /// Whether the tree honours the cardinality and one-word label rules.
    ///
    /// Diagnostic only: the pipeline never rejects a tree on this.
    pub fn is_well_formed(&self) -> bool {
        self.roots.len() <= MAX_ROOTS
            && self.roots.iter().all(|root| {
                is_single_upper_word(&root.label)
                    && root.branches.len() <= MAX_BRANCHES
                    && root.branches.iter().all(|branch| {
                        is_single_upper_word(&branch.label)
                            && branch.leaves.len() <= MAX_LEAVES
                            && branch.leaves.iter().all(|leaf| is_single_upper_word(leaf))
                    })
            })
    }
}

fn is_single_upper_word(word: &str) -> bool {
    !word.is_empty()
        && !word.chars().any(char::is_whitespace)
        && word.chars().any(char::is_alphabetic)
        && word.to_uppercase() == word
}

/// `{ choices: [{ message: { content } }] }`, the generation service's own
/// response shape, so callers can swap the pipeline in for a raw model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEnvelope {
    pub choices: Vec<EnvelopeChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeChoice {
    pub message: EnvelopeMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub content: String,
}

impl ChatEnvelope {
    /// Wrap serialized content in a single-choice envelope.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![EnvelopeChoice {
                message: EnvelopeMessage {
                    content: content.into(),
                },
            }],
        }
    }

    /// Content of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}
