//! Extraction entry points: document in, validated [`PayslipRecord`] out.
//!
//! One call runs the whole pipeline once:
//!
//! ```text
//! RawDocument ─ normalize ─▶ NormalizedImage ─ build ─▶ ExtractionRequest
//!     ─ VisionModel::complete ─▶ ModelResponse ─ recover ─▶ RecoveredJson
//!     ─ validate ─▶ PayslipRecord
//! ```
//!
//! Every intermediate is request-scoped and dropped before the call returns.
//! Failures are terminal: nothing is retried here.

use crate::config::{ExtractionConfig, ResponseMode, DEFAULT_MODEL};
use crate::error::ExtractionError;
use crate::pipeline::input::RawDocument;
use crate::pipeline::llm::{EdgequakeVisionModel, ModelResponse, VisionModel};
use crate::pipeline::normalize::normalize;
use crate::pipeline::openai::OpenAiToolModel;
use crate::pipeline::recover::{recover, Channel, RecoveryStage};
use crate::pipeline::request::{ExtractionRequestBuilder, OutputContract};
use crate::pipeline::validate::validate;
use crate::progress::{ProgressCallback, Stage};
use crate::record::PayslipRecord;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A validated record plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub record: PayslipRecord,
    pub stats: ExtractionStats,
}

/// Timings, sizes and token counts for one extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionStats {
    /// Backend that answered, e.g. `openai-tools`.
    pub backend: String,
    pub image_width: u32,
    pub image_height: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Response channel the record was recovered from.
    pub channel: Channel,
    /// First recovery stage that produced an object.
    pub recovery_stage: RecoveryStage,
    pub normalize_ms: u64,
    pub model_ms: u64,
    pub total_ms: u64,
}

/// Extract a payslip record from a document.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Any [`ExtractionError`]; see [`ExtractionError::kind`] for the
/// user-facing classification.
pub async fn extract(
    doc: RawDocument,
    config: &ExtractionConfig,
) -> Result<PayslipRecord, ExtractionError> {
    extract_with_stats(doc, config).await.map(|out| out.record)
}

/// Like [`extract`], also returning [`ExtractionStats`].
pub async fn extract_with_stats(
    doc: RawDocument,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractionError> {
    let total_start = Instant::now();
    let stages = StageTracker::new(config.progress_callback.as_ref());
    info!(
        "Starting extraction: {} document, {} bytes",
        doc.media_type(),
        doc.len()
    );

    // ── Step 1: Resolve model backend ────────────────────────────────────
    let model = resolve_model(config)?;

    // ── Step 2: Normalise document ───────────────────────────────────────
    let started = stages.start(Stage::Normalize);
    let normalize_config = config.clone();
    let image = tokio::task::spawn_blocking(move || normalize(doc, &normalize_config))
        .await
        .map_err(|e| ExtractionError::Internal(format!("normalisation task failed: {e}")))
        .and_then(|r| r);
    let image = stages.guard(Stage::Normalize, image)?;
    let normalize_ms = stages.complete(Stage::Normalize, started);
    let (image_width, image_height) = (image.width, image.height);
    info!(
        "Normalised to {}x{} PNG in {}ms",
        image_width, image_height, normalize_ms
    );

    // ── Step 3: Build request ────────────────────────────────────────────
    let started = stages.start(Stage::BuildRequest);
    let request = ExtractionRequestBuilder::new(config.instructions.as_deref())
        .build(image, OutputContract::payslip());
    stages.complete(Stage::BuildRequest, started);
    debug!("Request instructions: {} chars", request.instructions.len());

    // ── Step 4: Model call ───────────────────────────────────────────────
    let started = stages.start(Stage::ModelCall);
    info!("Calling {}", model.name());
    let response = call_with_timeout(model.as_ref(), &request, config.api_timeout_secs).await;
    drop(request);
    let response = stages.guard(Stage::ModelCall, response)?;
    let model_ms = stages.complete(Stage::ModelCall, started);
    info!(
        "{} answered in {}ms ({} in / {} out tokens)",
        model.name(),
        model_ms,
        response.input_tokens,
        response.output_tokens
    );

    // ── Step 5: Recover JSON ─────────────────────────────────────────────
    let started = stages.start(Stage::Recover);
    let recovered = stages.guard(Stage::Recover, recover(&response))?;
    stages.complete(Stage::Recover, started);
    info!(
        "Recovered JSON from {:?} channel ({:?})",
        recovered.channel, recovered.stage
    );

    // ── Step 6: Validate ─────────────────────────────────────────────────
    let started = stages.start(Stage::Validate);
    let validated = validate(&recovered).map_err(|defect| {
        warn!("Schema defect: {}", defect);
        ExtractionError::from(defect)
    });
    let record = stages.guard(Stage::Validate, validated)?;
    stages.complete(Stage::Validate, started);

    let total_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Extracted payslip for period '{}' in {}ms",
        record.period, total_ms
    );

    Ok(ExtractionOutput {
        record,
        stats: ExtractionStats {
            backend: model.name().to_string(),
            image_width,
            image_height,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            channel: recovered.channel,
            recovery_stage: recovered.stage,
            normalize_ms,
            model_ms,
            total_ms,
        },
    })
}

/// Load a local file and extract it.
pub async fn extract_file(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractionError> {
    let doc = RawDocument::from_path(path)?;
    extract_with_stats(doc, config).await
}

/// Synchronous wrapper around [`extract_with_stats`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    doc: RawDocument,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_with_stats(doc, config))
}

/// Run an already-obtained model answer through recovery and validation.
///
/// Accepts the raw text exactly as a model would send it, fences and
/// commentary included. No model call is made.
pub fn recover_and_validate(text: &str) -> Result<PayslipRecord, ExtractionError> {
    let recovered = recover(&ModelResponse::text(text))?;
    Ok(validate(&recovered)?)
}

/// Pick the backend that will answer, from most to least specific:
///
/// 1. `config.vision_model`, used as is;
/// 2. the strict tool-call backend, in [`ResponseMode::ToolCall`] when an API
///    key is available and no non-OpenAI edgequake provider was requested;
/// 3. an edgequake-llm provider (explicit, named, environment, auto-detected).
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ExtractionError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    let openai_compatible = config.provider.is_none()
        && config
            .provider_name
            .as_deref()
            .map_or(true, |name| name.eq_ignore_ascii_case("openai"));
    if config.response_mode == ResponseMode::ToolCall && openai_compatible {
        if let Some(model) = OpenAiToolModel::from_config(config) {
            return Ok(Arc::new(model));
        }
        debug!("No API key for the tool-call backend; falling back to free text");
    }

    let (provider, label) = resolve_provider(config)?;
    Ok(Arc::new(EdgequakeVisionModel::new(provider, label, config)))
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn call_with_timeout(
    model: &dyn VisionModel,
    request: &crate::pipeline::request::ExtractionRequest,
    timeout_secs: u64,
) -> Result<ModelResponse, ExtractionError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), model.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::UpstreamTimeout { secs: timeout_secs }),
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractionError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve an edgequake-llm provider and a label for logs.
///
/// 1. **Pre-built provider** (`config.provider`).
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Auto-detection** (`ProviderFactory::from_env`).
fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<(Arc<dyn LLMProvider>, String), ExtractionError> {
    if let Some(ref provider) = config.provider {
        return Ok((Arc::clone(provider), "edgequake".to_string()));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return Ok((create_vision_provider(name, model)?, format!("{name}/{model}")));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            let label = format!("{prov}/{env_model}");
            return Ok((create_vision_provider(&prov, &env_model)?, label));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return Ok((
                create_vision_provider("openai", model)?,
                format!("openai/{model}"),
            ));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractionError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok((llm_provider, "auto".to_string()))
}

/// Fans stage events out to the optional progress callback.
struct StageTracker<'a> {
    callback: Option<&'a ProgressCallback>,
}

impl<'a> StageTracker<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self { callback }
    }

    fn start(&self, stage: Stage) -> Instant {
        debug!("Stage start: {}", stage.label());
        if let Some(cb) = self.callback {
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn complete(&self, stage: Stage, started: Instant) -> u64 {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(cb) = self.callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
        elapsed_ms
    }

    /// Report a failing stage, then hand the result back unchanged.
    fn guard<T>(
        &self,
        stage: Stage,
        result: Result<T, ExtractionError>,
    ) -> Result<T, ExtractionError> {
        if let Err(ref e) = result {
            warn!("{} failed: {}", stage.label(), e);
            if let Some(cb) = self.callback {
                cb.on_failure(stage, &e.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::request::ExtractionRequest;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl VisionModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _: &ExtractionRequest) -> Result<ModelResponse, ExtractionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ModelResponse::text("{}"))
        }
    }

    #[test]
    fn explicit_vision_model_wins() {
        let config = ExtractionConfig::builder()
            .vision_model(Arc::new(Slow))
            .api_key("sk-test")
            .build()
            .unwrap();
        assert_eq!(resolve_model(&config).unwrap().name(), "slow");
    }

    #[test]
    fn tool_call_mode_with_key_uses_strict_backend() {
        let config = ExtractionConfig::builder()
            .api_key("sk-test")
            .response_mode(ResponseMode::ToolCall)
            .build()
            .unwrap();
        assert_eq!(resolve_model(&config).unwrap().name(), "openai-tools");
    }

    #[tokio::test]
    async fn model_call_times_out() {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 2));
        let request = ExtractionRequestBuilder::default().build(
            crate::pipeline::encode::encode_image(&img).unwrap(),
            OutputContract::payslip(),
        );
        let err = call_with_timeout(&Slow, &request, 1).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UpstreamTimeout { secs: 1 }));
    }

    #[test]
    fn recover_and_validate_reports_defect() {
        let err = recover_and_validate("```json\n{\"employeeName\": \"A\",}\n```").unwrap_err();
        match err {
            ExtractionError::SchemaDefect(d) => assert_eq!(d.path, "period"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn recover_and_validate_rejects_prose() {
        let err = recover_and_validate("Je ne peux pas lire ce document.").unwrap_err();
        assert!(matches!(err, ExtractionError::NoParsableJson { .. }));
    }
}
