//! Client for the remote memory store.
//!
//! The store is a single endpoint taking a JSON body whose `action` field
//! selects the operation. Bodies go out as `text/plain` so simple script
//! hosts accept them without a preflight.

use crate::types::{AtomicFact, ChatRole, ChatTurn, FactType, SearchRequest, Topic};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors from memory store calls.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to parse store response: {0}")]
    Parse(String),

    #[error("Failed to encode store request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Subject profile returned alongside search results.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub current_status: String,
}

/// Result of a keyword search.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RetrieveResult {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub persona: Option<Persona>,
    #[serde(default)]
    pub relevant_memories: Vec<String>,
}

impl RetrieveResult {
    /// A positive result carrying the given memories.
    pub fn found(memories: Vec<String>) -> Self {
        Self {
            found: true,
            persona: None,
            relevant_memories: memories,
        }
    }

    pub fn with_persona(mut self, bio: impl Into<String>, status: impl Into<String>) -> Self {
        self.persona = Some(Persona {
            bio: bio.into(),
            current_status: status.into(),
        });
        self
    }
}

/// Operations the pipeline needs from the memory store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Recent chat turns, oldest first.
    async fn recent_chat(&self) -> Result<Vec<ChatTurn>, StoreError>;

    /// Keyword search scoped to an owner.
    async fn retrieve(&self, request: &SearchRequest) -> Result<RetrieveResult, StoreError>;

    /// Persist one extracted fact.
    async fn store_fact(&self, fact: &AtomicFact) -> Result<(), StoreError>;

    /// Append one line to the stored chat log.
    async fn log_chat(&self, role: ChatRole, content: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action<'a> {
    GetRecentChat,
    RetrieveComplex {
        owner: &'a str,
        keywords: &'a [String],
    },
    StoreAtomic {
        fact: &'a str,
        importance: u8,
        owner: &'a str,
        #[serde(rename = "type")]
        kind: FactType,
        entities: &'a str,
        topics: Topic,
    },
    LogChat {
        role: ChatRole,
        content: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct RecentChat {
    #[serde(default)]
    history: Vec<Vec<Value>>,
}

/// Memory store reached over HTTP.
#[derive(Clone)]
pub struct HttpMemoryStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMemoryStore {
    /// Create a store client for `endpoint`, bounding every call by `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn send(&self, action: &Action<'_>) -> Result<String, StoreError> {
        let body = serde_json::to_string(action)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn recent_chat(&self) -> Result<Vec<ChatTurn>, StoreError> {
        let body = self.send(&Action::GetRecentChat).await?;
        let recent: RecentChat =
            serde_json::from_str(&body).map_err(|e| StoreError::Parse(e.to_string()))?;
        Ok(rows_to_turns(recent.history))
    }

    async fn retrieve(&self, request: &SearchRequest) -> Result<RetrieveResult, StoreError> {
        let body = self
            .send(&Action::RetrieveComplex {
                owner: &request.owner,
                keywords: &request.keywords,
            })
            .await?;
        serde_json::from_str(&body).map_err(|e| StoreError::Parse(e.to_string()))
    }

    async fn store_fact(&self, fact: &AtomicFact) -> Result<(), StoreError> {
        self.send(&Action::StoreAtomic {
            fact: &fact.fact,
            importance: fact.importance,
            owner: &fact.owner,
            kind: fact.kind,
            entities: &fact.owner,
            topics: fact.topics,
        })
        .await
        .map(|_| ())
    }

    async fn log_chat(&self, role: ChatRole, content: &str) -> Result<(), StoreError> {
        self.send(&Action::LogChat { role, content })
            .await
            .map(|_| ())
    }
}

/// Convert `[timestamp, role, content]` rows, skipping malformed ones.
fn rows_to_turns(rows: Vec<Vec<Value>>) -> Vec<ChatTurn> {
    rows.into_iter()
        .filter_map(|row| {
            let role = row.get(1).and_then(Value::as_str).and_then(ChatRole::parse);
            let content = row.get(2).and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });

            match (role, content) {
                (Some(role), Some(content)) => {
                    let timestamp = row.first().and_then(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    });
                    Some(ChatTurn {
                        role,
                        content,
                        timestamp,
                    })
                }
                _ => {
                    tracing::debug!(?row, "skipping malformed history row");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_builds_with_timeout() {
        assert!(HttpMemoryStore::new("https://script.example.com/exec", Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn test_action_wire_format() {
        let keywords = vec!["dad".to_string(), "father".to_string()];
        let body = serde_json::to_value(Action::RetrieveComplex {
            owner: "Arvin",
            keywords: &keywords,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"action": "retrieve_complex", "owner": "Arvin", "keywords": ["dad", "father"]})
        );

        let body = serde_json::to_value(Action::GetRecentChat).unwrap();
        assert_eq!(body, json!({"action": "get_recent_chat"}));

        let body = serde_json::to_value(Action::LogChat {
            role: ChatRole::User,
            content: "hello",
        })
        .unwrap();
        assert_eq!(body, json!({"action": "log_chat", "role": "user", "content": "hello"}));
    }

    #[test]
    fn test_store_atomic_wire_format() {
        let fact = AtomicFact::new("Ferdy hates spinach", 6, "Ferdy")
            .with_kind(FactType::Bio)
            .with_topic(Topic::Preference);
        let body = serde_json::to_value(Action::StoreAtomic {
            fact: &fact.fact,
            importance: fact.importance,
            owner: &fact.owner,
            kind: fact.kind,
            entities: &fact.owner,
            topics: fact.topics,
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "action": "store_atomic",
                "fact": "Ferdy hates spinach",
                "importance": 6,
                "owner": "Ferdy",
                "type": "Bio",
                "entities": "Ferdy",
                "topics": "Preference"
            })
        );
    }

    #[test]
    fn test_retrieve_result_parsing() {
        let result: RetrieveResult = serde_json::from_value(json!({
            "found": true,
            "persona": {"bio": "Likes jazz", "current_status": "At work"},
            "relevant_memories": ["Arvin dated Suwandi in 2019"]
        }))
        .unwrap();
        assert!(result.found);
        assert_eq!(result.persona.unwrap().current_status, "At work");

        let result: RetrieveResult = serde_json::from_value(json!({"found": false})).unwrap();
        assert!(!result.found);
        assert!(result.relevant_memories.is_empty());
    }

    #[test]
    fn test_rows_to_turns() {
        let recent: RecentChat = serde_json::from_value(json!({
            "history": [
                ["2024-05-01T10:00:00Z", "user", "hi"],
                ["2024-05-01T10:00:05Z", "assistant", "hello"],
                ["2024-05-01T10:01:00Z", "robot", "beep"],
                ["2024-05-01T10:02:00Z", "user"],
                [1714557720000i64, "user", 42]
            ]
        }))
        .unwrap();

        let turns = rows_to_turns(recent.history);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], ChatTurn::user("hi").at("2024-05-01T10:00:00Z"));
        assert_eq!(turns[1].role, ChatRole::Assistant);
        assert_eq!(turns[2].content, "42");
        assert_eq!(turns[2].timestamp.as_deref(), Some("1714557720000"));
    }
}
