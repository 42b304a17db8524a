//! Strict backend: OpenAI-compatible chat completions with a forced function call.
//!
//! The contract's JSON schema is sent as the `parameters` of a single tool and
//! `tool_choice` forces the model to call it. The arguments then arrive as a
//! JSON string with no surrounding prose. Any `content` the model emits
//! alongside is kept as the free-text fallback.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, Azure-compatible proxies, vLLM, LiteLLM, Ollama's OpenAI shim).

use crate::config::{ExtractionConfig, DEFAULT_API_BASE};
use crate::error::ExtractionError;
use crate::pipeline::llm::{ModelResponse, ToolCall, VisionModel};
use crate::pipeline::request::{ExtractionRequest, TOOL_NAME};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Chat-completions client forcing the `submit_payslip` function.
pub struct OpenAiToolModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

impl OpenAiToolModel {
    /// Build from the config, falling back to `OPENAI_API_KEY` / `OPENAI_BASE_URL`.
    ///
    /// Returns `None` when no API key can be found.
    pub fn from_config(config: &ExtractionConfig) -> Option<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())?;
        let base_url = config
            .api_base
            .clone()
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Some(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model_name().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// The JSON body sent to `/chat/completions`.
    pub fn request_body(&self, request: &ExtractionRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.instructions },
                    {
                        "type": "image_url",
                        "image_url": { "url": request.image.data_uri(), "detail": "high" }
                    }
                ]
            }],
            "tools": [request.tool_definition()],
            "tool_choice": { "type": "function", "function": { "name": TOOL_NAME } }
        })
    }
}

/// Turn a decoded completion into a [`ModelResponse`].
fn into_response(completion: ChatCompletion) -> ModelResponse {
    let usage = completion.usage.unwrap_or(Usage {
        prompt_tokens: 0,
        completion_tokens: 0,
    });
    let message = completion.choices.into_iter().next().map(|c| c.message);

    let (text, tool_call) = match message {
        Some(m) => {
            let call = m.tool_calls.into_iter().flatten().next().map(|t| ToolCall {
                name: t.function.name,
                arguments: t.function.arguments,
            });
            (m.content.filter(|c| !c.trim().is_empty()), call)
        }
        None => (None, None),
    };

    ModelResponse {
        tool_call,
        text,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

#[async_trait]
impl VisionModel for OpenAiToolModel {
    fn name(&self) -> &str {
        "openai-tools"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<ModelResponse, ExtractionError> {
        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %self.model, "calling {} with forced tool", url);

        let upstream = |detail: String| ExtractionError::UpstreamFailure {
            provider: self.name().to_string(),
            detail,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(ExtractionError::RateLimitExceeded {
                provider: self.name().to_string(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(upstream(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| upstream(format!("malformed completion body: {e}")))?;
        let response = into_response(completion);
        debug!(
            "openai-tools: {} input tokens, {} output tokens, tool_call={}",
            response.input_tokens,
            response.output_tokens,
            response.tool_call.is_some()
        );
        Ok(response)
    }
}
