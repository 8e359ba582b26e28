//! Conversational memory pipeline.
//!
//! This crate provides:
//! - Relationship resolution and single-pass fact extraction via an LLM
//! - Clarifying questions for significant but undated events
//! - Keyword-aggregated retrieval from a remote memory store
//! - Replies annotated with a root/branch/leaf mood tree
//! - Detached write-back of chat logs and extracted facts
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use symbiosis_core::{HttpMemoryStore, Pipeline, PipelineConfig, TurnRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = Arc::new(openrouter::OpenRouter::new()?);
//!     let store = Arc::new(HttpMemoryStore::new("https://script.example.com/exec", Duration::from_secs(30))?);
//!     let pipeline = Pipeline::new(generator, store, PipelineConfig::default());
//!
//!     let mut session = pipeline.restore_session().await;
//!     let reply = pipeline
//!         .process_turn(&mut session, &TurnRequest::new("My dad is eating spinach", "sk-or-..."))
//!         .await?;
//!     println!("{}", reply.tree.response);
//!
//!     pipeline.flush().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod generation;
pub mod json;
pub mod outbox;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod testing;
pub mod types;

// Primary public API
pub use config::{ConfigError, SymbiosisConfig};
pub use generation::TextGeneration;
pub use pipeline::completion::{Completion, CompletionError, ValidatedCompletion};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, TurnOutcome, TurnReply, TurnRequest};
pub use session::Session;
pub use store::{HttpMemoryStore, MemoryStore, RetrieveResult, StoreError};
pub use testing::{InMemoryStore, ScriptedGenerator};
pub use types::{AtomicFact, ChatEnvelope, ChatRole, ChatTurn, FactType, Mood, MoodTree, Topic};
