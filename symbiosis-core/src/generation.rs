//! Seam to the text-generation service.

use async_trait::async_trait;
use openrouter::{Message, OpenRouter, Request};

/// Anything that turns a prompt into a completion string.
#[async_trait]
pub trait TextGeneration: Send + Sync {
    /// Run one completion and return the raw content of the first choice.
    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        credential: &str,
    ) -> Result<String, openrouter::Error>;
}

#[async_trait]
impl TextGeneration for OpenRouter {
    async fn generate(
        &self,
        model: &str,
        messages: &[Message],
        credential: &str,
    ) -> Result<String, openrouter::Error> {
        let request = Request::new(model, messages.to_vec());
        let response = self.complete(request, credential).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(openrouter::Error::EmptyResponse)
    }
}
