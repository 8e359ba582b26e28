//! Per-turn orchestration.
//!
//! A turn runs strictly in sequence:
//!
//! ```text
//! resolve relationships -> analyze -> intercept? -> retrieve -> generate -> persist
//! ```
//!
//! Only generation (or the clarifying question, when the interceptor fires)
//! can fail a turn. Every other stage degrades to an empty result. Chat
//! logging and fact persistence go through the [`Outbox`] and are never
//! awaited by the caller.

pub mod analyzer;
pub mod completion;
pub mod interceptor;
pub mod persister;
pub mod relationship;
pub mod response;
pub mod retrieval;

use crate::config::{GenerationConfig, SymbiosisConfig};
use crate::generation::TextGeneration;
use crate::outbox::Outbox;
use crate::session::{self, history_text, Session};
use crate::store::MemoryStore;
use crate::types::{ChatEnvelope, ChatRole, MoodTree};
use analyzer::FactAnalyzer;
use completion::{CompletionError, ValidatedCompletion};
use interceptor::AmbiguityInterceptor;
use relationship::RelationshipResolver;
use response::{ReplyMode, ResponseGenerator};
use retrieval::{MemoryRetriever, RetrievalInput};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

/// Errors that end a turn without a reply.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reply generation failed: {0}")]
    Generation(#[source] CompletionError),

    #[error("clarifying question failed: {0}")]
    Clarification(#[source] CompletionError),

    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Settings fixed for the lifetime of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// The self identity: default fact owner and query subject.
    pub identity: String,
    /// Deadline for each model call attempt.
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&SymbiosisConfig::default())
    }
}

impl From<&SymbiosisConfig> for PipelineConfig {
    fn from(config: &SymbiosisConfig) -> Self {
        Self {
            identity: config.persona.identity.clone(),
            call_timeout: Duration::from_secs(config.generation.request_timeout_secs),
        }
    }
}

/// Inputs of one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub utterance: String,
    pub credential: String,
    pub high_model: String,
    pub low_model: String,
    /// Interrogation tone instead of companion tone.
    pub question_mode: bool,
}

impl TurnRequest {
    /// A request using the default models in companion mode.
    pub fn new(utterance: impl Into<String>, credential: impl Into<String>) -> Self {
        let models = GenerationConfig::default();
        Self {
            utterance: utterance.into(),
            credential: credential.into(),
            high_model: models.high_model,
            low_model: models.low_model,
            question_mode: false,
        }
    }

    pub fn with_models(mut self, high: impl Into<String>, low: impl Into<String>) -> Self {
        self.high_model = high.into();
        self.low_model = low.into();
        self
    }

    pub fn with_question_mode(mut self, question_mode: bool) -> Self {
        self.question_mode = question_mode;
        self
    }
}

/// How a successful turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A normal reply.
    Answered,
    /// A clarifying question about an undated event.
    Clarifying,
}

/// The result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub tree: MoodTree,
    /// Serialized tree, as placed in the envelope.
    pub raw: String,
    pub outcome: TurnOutcome,
}

impl TurnReply {
    /// The reply in the generation service's own response shape.
    pub fn envelope(&self) -> ChatEnvelope {
        ChatEnvelope::from_content(self.raw.clone())
    }
}

/// The conversational memory pipeline.
pub struct Pipeline<G: ?Sized, S: ?Sized> {
    resolver: RelationshipResolver<G, S>,
    analyzer: FactAnalyzer<G>,
    interceptor: AmbiguityInterceptor<G>,
    retriever: MemoryRetriever<S>,
    responder: ResponseGenerator<G>,
    store: Arc<S>,
    outbox: Outbox,
}

impl<G, S> Pipeline<G, S>
where
    G: TextGeneration + ?Sized,
    S: MemoryStore + ?Sized + 'static,
{
    /// Build a pipeline. Must be called inside a tokio runtime, since the
    /// write-back worker is spawned here.
    pub fn new(generator: Arc<G>, store: Arc<S>, config: PipelineConfig) -> Self {
        let completion = ValidatedCompletion::new(generator, config.call_timeout);

        Self {
            resolver: RelationshipResolver::new(completion.clone(), Arc::clone(&store), &config.identity),
            analyzer: FactAnalyzer::new(completion.clone(), &config.identity),
            interceptor: AmbiguityInterceptor::new(completion.clone()),
            retriever: MemoryRetriever::new(Arc::clone(&store), &config.identity),
            responder: ResponseGenerator::new(completion),
            outbox: Outbox::spawn(Arc::clone(&store)),
            store,
        }
    }

    /// Start a session from the store's recent history.
    pub async fn restore_session(&self) -> Session {
        Session::from_history(session::restore(self.store.as_ref()).await)
    }

    /// Process one user utterance.
    ///
    /// On success the exchange is appended to `session`; on failure the
    /// session is left untouched.
    pub async fn process_turn(
        &self,
        session: &mut Session,
        request: &TurnRequest,
    ) -> Result<TurnReply, PipelineError> {
        let span = info_span!("turn", session = %session.id());
        self.run_turn(session, request).instrument(span).await
    }

    /// Wait until all queued write-backs have been attempted.
    pub async fn flush(&self) {
        self.outbox.flush().await;
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        request: &TurnRequest,
    ) -> Result<TurnReply, PipelineError> {
        let utterance = request.utterance.as_str();
        let credential = request.credential.as_str();
        self.outbox.log_chat(ChatRole::User, utterance);

        let relationships = self
            .resolver
            .resolve(utterance, &request.low_model, credential)
            .await;

        let history = history_text(session.history());
        let analysis = self
            .analyzer
            .analyze(utterance, &history, &relationships, &request.high_model, credential)
            .await;

        if let Some(clarification) = self
            .interceptor
            .intercept(&analysis.entries, utterance, &request.high_model, credential)
            .await
        {
            let tree = clarification.map_err(PipelineError::Clarification)?;
            let raw = serde_json::to_string(&tree)?;
            session.record_exchange(utterance, &tree.response);
            info!("asked clarifying question");
            return Ok(TurnReply {
                tree,
                raw,
                outcome: TurnOutcome::Clarifying,
            });
        }

        let retrieval = self
            .retriever
            .retrieve(RetrievalInput {
                utterance,
                history: session.history(),
                relationship_context: &relationships,
                search_keywords: &analysis.search_keywords,
                entries: &analysis.entries,
                query_subject: &analysis.query_subject,
            })
            .await;
        if !retrieval.context.is_empty() {
            session.set_last_retrieved_context(retrieval.context.clone());
        }

        let reply = self
            .responder
            .generate(
                ReplyMode::from_question_mode(request.question_mode),
                &retrieval.context,
                &history,
                utterance,
                &request.high_model,
                credential,
            )
            .await
            .map_err(PipelineError::Generation)?;

        self.outbox.log_chat(ChatRole::Assistant, reply.parsed.response.as_str());
        let queued = persister::persist(&self.outbox, &analysis.entries);
        session.record_exchange(utterance, &reply.parsed.response);
        info!(mood = ?reply.parsed.mood, facts_queued = queued, "turn complete");

        Ok(TurnReply {
            tree: reply.parsed,
            raw: reply.raw,
            outcome: TurnOutcome::Answered,
        })
    }
}
