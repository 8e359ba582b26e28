//! Validated retry around the generation service.
//!
//! Every model call in the pipeline goes through [`ValidatedCompletion`]:
//! one request, JSON extraction, typed decoding, a caller-supplied shape
//! check, and at most [`MAX_ATTEMPTS`] tries before giving up.

use crate::generation::TextGeneration;
use crate::json::extract_object;
use openrouter::Message;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Total attempts per call, first try included.
pub const MAX_ATTEMPTS: usize = 2;

/// Errors from a validated completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("{label} failed after {attempts} attempts")]
    Exhausted { label: String, attempts: usize },
}

/// An accepted completion.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    /// The decoded payload; always accepted by the validator.
    pub parsed: T,
    /// The JSON text the payload was decoded from.
    pub raw: String,
}

/// Why a single attempt was discarded.
#[derive(Debug, Error)]
enum Rejection {
    #[error("service error: {0}")]
    Service(#[from] openrouter::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no JSON object in output")]
    NoJson,

    #[error("unexpected shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rejected by validator")]
    Invalid,
}

/// Calls the generation service until a validated payload comes back.
pub struct ValidatedCompletion<G: ?Sized> {
    generator: Arc<G>,
    timeout: Duration,
}

impl<G: ?Sized> Clone for ValidatedCompletion<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            timeout: self.timeout,
        }
    }
}

impl<G> ValidatedCompletion<G>
where
    G: TextGeneration + ?Sized,
{
    /// Wrap a generator; each attempt is abandoned after `timeout`.
    pub fn new(generator: Arc<G>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Run the call, returning only a payload that `validate` accepts.
    pub async fn complete<T, F>(
        &self,
        messages: &[Message],
        model: &str,
        credential: &str,
        validate: F,
        label: &str,
    ) -> Result<Completion<T>, CompletionError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(messages, model, credential, &validate).await {
                Ok(completion) => {
                    debug!(label, attempt, "completion accepted");
                    return Ok(completion);
                }
                Err(reason) => warn!(label, attempt, %reason, "completion attempt rejected"),
            }
        }

        Err(CompletionError::Exhausted {
            label: label.to_string(),
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn attempt<T, F>(
        &self,
        messages: &[Message],
        model: &str,
        credential: &str,
        validate: &F,
    ) -> Result<Completion<T>, Rejection>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let output = tokio::time::timeout(
            self.timeout,
            self.generator.generate(model, messages, credential),
        )
        .await
        .map_err(|_| Rejection::Timeout(self.timeout))??;

        let raw = extract_object(&output).ok_or(Rejection::NoJson)?;
        let parsed: T = serde_json::from_str(raw)?;

        if !validate(&parsed) {
            return Err(Rejection::Invalid);
        }

        Ok(Completion {
            parsed,
            raw: raw.to_string(),
        })
    }
}
