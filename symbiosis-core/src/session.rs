//! Conversation session state and startup restoration.
//!
//! A `Session` is created at startup (usually from restored history),
//! updated after every turn, and dropped when the conversation ends. It is
//! the only state that outlives a single turn apart from the memory store.

use crate::store::MemoryStore;
use crate::types::{ChatRole, ChatTurn};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// Gap after which a restored conversation is treated as resumed.
pub const TIME_GAP_HOURS: f64 = 6.0;

/// One conversation.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    history: Vec<ChatTurn>,
    last_retrieved_context: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Start an empty session.
    pub fn new() -> Self {
        Self::from_history(Vec::new())
    }

    /// Start a session on top of previously stored turns.
    pub fn from_history(history: Vec<ChatTurn>) -> Self {
        Self {
            id: Uuid::new_v4(),
            history,
            last_retrieved_context: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Turns so far, oldest first.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// The most recent non-empty retrieval block.
    pub fn last_retrieved_context(&self) -> Option<&str> {
        self.last_retrieved_context.as_deref()
    }

    pub(crate) fn set_last_retrieved_context(&mut self, context: String) {
        self.last_retrieved_context = Some(context);
    }

    /// Record a completed exchange.
    pub(crate) fn record_exchange(&mut self, utterance: &str, reply: &str) {
        let now = Utc::now().to_rfc3339();
        self.history.push(ChatTurn::user(utterance).at(now.clone()));
        self.history.push(ChatTurn::assistant(reply).at(now));
    }
}

/// Render history as `ROLE: content` lines.
pub fn history_text(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str().to_uppercase(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last `max_chars` characters of `text`.
pub fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Load recent turns from the store, annotating a long absence.
///
/// Any failure leaves the history empty; the rest of the system copes.
pub async fn restore<S>(store: &S) -> Vec<ChatTurn>
where
    S: MemoryStore + ?Sized,
{
    restore_at(store, Utc::now()).await
}

/// [`restore`] against an explicit clock.
pub async fn restore_at<S>(store: &S, now: DateTime<Utc>) -> Vec<ChatTurn>
where
    S: MemoryStore + ?Sized,
{
    match store.recent_chat().await {
        Ok(mut history) => {
            if let Some(hours) = annotate_time_gap(&mut history, now) {
                info!(hours, "time gap detected, marking resumed session");
            }
            info!(turns = history.len(), "session restored");
            history
        }
        Err(e) => {
            warn!(error = %e, "session restore failed, starting empty");
            Vec::new()
        }
    }
}

/// Append a system note when the last turn is more than six hours old.
///
/// Returns the whole hours elapsed when a note was added.
pub fn annotate_time_gap(history: &mut Vec<ChatTurn>, now: DateTime<Utc>) -> Option<i64> {
    let last = history.last()?.timestamp.as_deref().and_then(parse_timestamp)?;
    let hours = (now - last).num_seconds() as f64 / 3600.0;
    if hours <= TIME_GAP_HOURS {
        return None;
    }

    let whole = hours.floor() as i64;
    history.push(ChatTurn::new(
        ChatRole::System,
        format!(
            "[SYSTEM_NOTE: The user has returned after {whole} hours. \
             Treat this as a new session context, but retain previous memories.]"
        ),
    ));
    Some(whole)
}

/// Parse the timestamp formats the store has been seen to emit.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
