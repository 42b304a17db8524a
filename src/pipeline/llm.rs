//! Upstream model seam: [`VisionModel`] and its edgequake-llm backend.
//!
//! The pipeline only depends on the narrow contract below: one request in,
//! one [`ModelResponse`] out. A response may carry a function-call payload,
//! free text, or both; [`crate::pipeline::recover`] decides which to trust.
//!
//! No retries happen here. A failed or timed-out call is returned to the
//! caller as a typed error and the caller owns retry policy.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::pipeline::request::ExtractionRequest;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// A function/tool call returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    /// JSON-encoded arguments, as sent by the provider.
    pub arguments: String,
}

/// Raw model output, before any recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    /// Structured channel. Preferred whenever present.
    pub tool_call: Option<ToolCall>,
    /// Free-text channel.
    pub text: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelResponse {
    /// A free-text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            ..Default::default()
        }
    }

    /// A function-call-only response.
    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            tool_call: Some(ToolCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
            ..Default::default()
        }
    }
}

/// A vision-capable model able to answer an [`ExtractionRequest`].
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Short backend identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Send one request and return the raw response.
    async fn complete(&self, request: &ExtractionRequest) -> Result<ModelResponse, ExtractionError>;
}

/// Free-text backend over any edgequake-llm provider.
///
/// The instructions and the page image travel as one user message, the way
/// the model sees a person handing it a document with a note attached.
pub struct EdgequakeVisionModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
}

impl EdgequakeVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl VisionModel for EdgequakeVisionModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<ModelResponse, ExtractionError> {
        let messages = vec![ChatMessage::user_with_images(
            request.instructions.as_str(),
            vec![request.image.to_image_data()],
        )];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ExtractionError::UpstreamFailure {
                provider: self.label.clone(),
                detail: format!("{}", e),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        Ok(ModelResponse {
            tool_call: None,
            text: Some(response.content),
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
