//! Configuration types for payslip extraction.
//!
//! Every knob of the pipeline lives in [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The config is a plain value passed into each
//! call: the library keeps no client singleton or other process-wide state,
//! so two extractions with different configs can run side by side.

use crate::error::ExtractionError;
use crate::pipeline::llm::VisionModel;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Base URL of the strict tool-call backend when `OPENAI_BASE_URL` is unset.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for a payslip extraction.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use payslip_waterfall::{ExtractionConfig, ResponseMode};
///
/// let config = ExtractionConfig::builder()
///     .render_scale(2.0)
///     .response_mode(ResponseMode::FreeText)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Upscaling factor applied when rasterising the first PDF page. Range: 1.0–4.0. Default: 2.0.
    ///
    /// Payslips are dense: contribution rates and bases are printed in small
    /// type. A 2× render keeps them legible to the model while the PNG stays
    /// far below upload limits.
    pub render_scale: f32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps either edge regardless of the scale factor, so an oversized page
    /// cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Fully custom model backend. Takes precedence over everything else.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Which response channel to ask the model for. Default: [`ResponseMode::ToolCall`].
    pub response_mode: ResponseMode,

    /// Base URL for the strict tool-call backend. Falls back to `OPENAI_BASE_URL`.
    pub api_base: Option<String>,

    /// API key for the strict tool-call backend. Falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription, not writing: any creativity shows up as
    /// invented lines or misread amounts.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2000.
    ///
    /// A full payslip with every contribution line fits comfortably; setting
    /// this too low truncates the JSON mid-object.
    pub max_tokens: usize,

    /// Timeout for the single model call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom instruction text. If None, uses [`crate::prompts::DEFAULT_INSTRUCTIONS`].
    pub instructions: Option<String>,

    /// Path to a libpdfium shared library. If None, binds to the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional stage-progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            max_rendered_pixels: 4000,
            model: None,
            provider_name: None,
            provider: None,
            vision_model: None,
            response_mode: ResponseMode::default(),
            api_base: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: 2000,
            api_timeout_secs: 120,
            instructions: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "vision_model",
                &self.vision_model.as_ref().map(|m| m.name().to_string()),
            )
            .field("response_mode", &self.response_mode)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("custom_instructions", &self.instructions.is_some())
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model name to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.config.response_mode = mode;
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractionError> {
        let c = &self.config;
        if !(1.0..=4.0).contains(&c.render_scale) {
            return Err(ExtractionError::InvalidConfig(format!(
                "Render scale must be 1.0–4.0, got {}",
                c.render_scale
            )));
        }
        if c.max_tokens == 0 {
            return Err(ExtractionError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExtractionError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref text) = c.instructions {
            if text.trim().is_empty() {
                return Err(ExtractionError::InvalidConfig(
                    "Custom instructions must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which channel the model is asked to answer on.
///
/// | Mode | Channel | Output guarantee |
/// |------|---------|------------------|
/// | `ToolCall` | forced function call whose parameters are the contract schema | single JSON object, no prose |
/// | `FreeText` | plain chat completion with the contract spelled out in the prompt | best effort; recovered by scraping |
///
/// Free-text answers are always recovered as a fallback, so `ToolCall` never
/// loses information compared to `FreeText`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Strict: constrain the answer through a tool/function-call schema. (default)
    #[default]
    ToolCall,
    /// Prompt-only: ask for bare JSON in the message body.
    FreeText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.render_scale, 2.0);
        assert_eq!(c.max_tokens, 2000);
        assert_eq!(c.response_mode, ResponseMode::ToolCall);
        assert_eq!(c.model_name(), DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_scale() {
        let c = ExtractionConfig::builder().render_scale(9.0).build().unwrap();
        assert_eq!(c.render_scale, 4.0);
        let c = ExtractionConfig::builder().render_scale(0.1).build().unwrap();
        assert_eq!(c.render_scale, 1.0);
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ExtractionConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_blank_instructions() {
        assert!(ExtractionConfig::builder()
            .instructions("   ")
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder()
            .api_key("sk-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
