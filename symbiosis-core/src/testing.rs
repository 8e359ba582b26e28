//! Testing utilities for the pipeline.
//!
//! This module provides deterministic stand-ins for both remote services:
//! - `ScriptedGenerator` replays canned model outputs in order
//! - `InMemoryStore` answers searches from a queue and records every write

use crate::generation::TextGeneration;
use crate::store::{MemoryStore, RetrieveResult, StoreError};
use crate::types::{AtomicFact, ChatRole, ChatTurn, SearchRequest};
use async_trait::async_trait;
use openrouter::Message;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One recorded call to the generator.
#[derive(Debug, Clone)]
pub struct GeneratorCall {
    pub model: String,
    pub messages: Vec<Message>,
}

impl GeneratorCall {
    /// All message contents joined, for prompt assertions.
    pub fn prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A generator that returns scripted outputs.
///
/// Once the script runs out every call fails with a network error, which
/// the pipeline treats like any other failed attempt.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, openrouter::Error>>>,
    calls: Mutex<Vec<GeneratorCall>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful output.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Err(openrouter::Error::Network(message.into())));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an output after construction.
    pub fn push(&self, output: Result<String, openrouter::Error>) {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).push_back(output);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TextGeneration for ScriptedGenerator {
    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        _credential: &str,
    ) -> Result<String, openrouter::Error> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(GeneratorCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(openrouter::Error::Network("no scripted response".to_string())))
    }
}

/// A memory store held entirely in memory.
///
/// Searches are answered from a queue in call order; an empty queue answers
/// "not found". Writes are recorded for assertions.
#[derive(Default)]
pub struct InMemoryStore {
    recent: Vec<ChatTurn>,
    results: Mutex<VecDeque<RetrieveResult>>,
    searches: Mutex<Vec<SearchRequest>>,
    facts: Mutex<Vec<AtomicFact>>,
    log: Mutex<Vec<(ChatRole, String)>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History returned by `recent_chat`.
    pub fn with_recent_chat(mut self, history: Vec<ChatTurn>) -> Self {
        self.recent = history;
        self
    }

    /// Queue the answer for the next search.
    pub fn with_result(self, result: RetrieveResult) -> Self {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).push_back(result);
        self
    }

    /// Make `recent_chat` and `retrieve` fail.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Make `store_fact` and `log_chat` fail.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Every search issued, in order.
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn stored_facts(&self) -> Vec<AtomicFact> {
        self.facts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn logged(&self) -> Vec<(ChatRole, String)> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn unavailable() -> StoreError {
        StoreError::Network("store unavailable".to_string())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn recent_chat(&self) -> Result<Vec<ChatTurn>, StoreError> {
        if self.fail_reads {
            return Err(Self::unavailable());
        }
        Ok(self.recent.clone())
    }

    async fn retrieve(&self, request: &SearchRequest) -> Result<RetrieveResult, StoreError> {
        self.searches.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        if self.fail_reads {
            return Err(Self::unavailable());
        }
        Ok(self.results.lock().unwrap_or_else(PoisonError::into_inner).pop_front().unwrap_or_default())
    }

    async fn store_fact(&self, fact: &AtomicFact) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(Self::unavailable());
        }
        self.facts.lock().unwrap_or_else(PoisonError::into_inner).push(fact.clone());
        Ok(())
    }

    async fn log_chat(&self, role: ChatRole, content: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(Self::unavailable());
        }
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push((role, content.to_string()));
        Ok(())
    }
}
