//! Completion service abstraction
//!
//! Evaluator agents talk to a language model through `CompletionService`.
//! The production implementation is the Anthropic Messages API.

mod anthropic;
mod error;
mod json;
mod types;

pub use anthropic::{AnthropicConfig, AnthropicService};
pub use error::LlmError;
pub use json::parse_json_completion;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// `complete(messages, options) -> {content, model, tokenUsage}`
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;

    /// Model identifier, for logs
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: CompletionService + ?Sized> CompletionService for Arc<T> {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        (**self).complete(messages, options).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn CompletionService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn CompletionService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl CompletionService for LoggingService {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(messages, options).await;
        let duration = start.elapsed();

        match &result {
            Ok(completion) => {
                tracing::info!(
                    model = %completion.model,
                    duration_ms = %duration.as_millis(),
                    input_tokens = completion.token_usage.input_tokens,
                    output_tokens = completion.token_usage.output_tokens,
                    "Completion request finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    retryable = e.is_retryable(),
                    retry_after = ?e.retry_after,
                    "Completion request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
