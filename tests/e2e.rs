//! End-to-end integration tests for payslip-waterfall.
//!
//! The first group drives the full pipeline against a scripted
//! [`VisionModel`] on an in-memory image, so it always runs.
//!
//! The live group uses real payslips in `./test_cases/` and makes real LLM
//! API calls. It is gated behind the `E2E_ENABLED` environment variable.
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use payslip_waterfall::{
    extract, extract_file, extract_sync, extract_with_stats, reconcile, Channel, DefectReason,
    ErrorKind, ExtractionConfig, ExtractionError, ExtractionProgressCallback, ExtractionRequest,
    MediaType, ModelResponse, RawDocument, RecoveryStage, Stage, VisionModel,
};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// A model that always gives the same answer and counts its calls.
struct Scripted {
    response: Result<ModelResponse, fn() -> ExtractionError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_instructions: Mutex<Option<String>>,
}

impl Scripted {
    fn answering(response: ModelResponse) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(response),
            delay: None,
            calls: AtomicUsize::new(0),
            last_instructions: Mutex::new(None),
        })
    }

    fn failing(err: fn() -> ExtractionError) -> Arc<Self> {
        Arc::new(Self {
            response: Err(err),
            delay: None,
            calls: AtomicUsize::new(0),
            last_instructions: Mutex::new(None),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(ModelResponse::text("{}")),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            last_instructions: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<ModelResponse, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_instructions.lock().unwrap() = Some(request.instructions.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match &self.response {
            Ok(r) => Ok(r.clone()),
            Err(make) => Err(make()),
        }
    }
}

fn config_for(model: Arc<Scripted>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .vision_model(model)
        .build()
        .unwrap()
}

fn payslip_image(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 80, Rgb([250, 250, 250])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn png_document() -> RawDocument {
    RawDocument::new(payslip_image(ImageFormat::Png), MediaType::Png)
}

/// A consistent payslip: superGross 4200, net paid 2200.
fn sample_json() -> String {
    r#"{
        "employeeName": "Jeanne Martin",
        "period": "janvier 2024",
        "grossSalary": 3000.0,
        "netSalaryBeforeTax": 2340.0,
        "netSalaryAfterTax": 2200.0,
        "employerContributions": {
            "total": 1200.0,
            "health": { "total": 300.0, "lines": [{ "name": "Maladie", "amount": 300.0 }] },
            "retirement": { "total": 500.0, "lines": [{ "name": "Sécurité Sociale plafonnée", "amount": 500.0 }] },
            "family": { "total": 150.0, "lines": [{ "name": "Allocations familiales", "amount": 150.0 }] },
            "unemployment": { "total": 120.0, "lines": [{ "name": "Assurance chômage", "amount": 120.0 }] },
            "cse": { "total": 30.0, "lines": [{ "name": "CSE fonctionnement", "amount": 30.0 }] },
            "other": { "total": 100.0, "lines": [{ "name": "Formation professionnelle", "amount": 100.0 }] }
        },
        "employeeContributions": {
            "total": 660.0,
            "health": { "total": 0, "lines": [] },
            "retirement": { "total": 300.0, "lines": [{ "name": "Complémentaire Tranche 1", "amount": 300.0 }] },
            "unemployment": { "total": 0, "lines": [] },
            "csgCrds": { "total": 360.0, "lines": [
                { "name": "CSG déductible", "amount": 200.0 },
                { "name": "CSG/CRDS non déductible", "amount": 160.0 }
            ] },
            "other": { "total": 0, "lines": [] }
        },
        "superGross": 4200.0,
        "withholdingTax": { "amount": 140.0, "line": "Impôt sur le revenu prélevé à la source - PAS", "rate": "6" }
    }"#
    .to_string()
}

// ── Offline pipeline tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_tool_call_answer_end_to_end() {
    let model = Scripted::answering(ModelResponse::tool_call("submit_payslip", sample_json()));
    let config = config_for(model.clone());

    let output = extract_with_stats(png_document(), &config).await.unwrap();
    assert_eq!(model.calls(), 1);
    assert_eq!(output.record.employee_name, "Jeanne Martin");
    assert_eq!(output.stats.channel, Channel::ToolCall);
    assert_eq!(output.stats.recovery_stage, RecoveryStage::Direct);
    assert_eq!((output.stats.image_width, output.stats.image_height), (60, 80));
    assert_eq!(output.stats.backend, "scripted");

    let instructions = model.last_instructions.lock().unwrap().clone().unwrap();
    assert!(instructions.contains("csgCrds"));
    assert!(!instructions.contains("{contract}"));

    let waterfall = reconcile(&output.record);
    assert_eq!(waterfall.super_gross, 4200.0);
    assert!(waterfall.is_consistent());
    let sum: f64 = waterfall
        .cascade
        .iter()
        .map(|e| e.percentage_of_super_gross)
        .sum();
    assert!((sum - 100.0).abs() <= 0.1);
}

#[tokio::test]
async fn test_fenced_free_text_with_trailing_comma() {
    let body = sample_json();
    let trimmed = body.trim_end().trim_end_matches('}');
    let text = format!("Voici l'extraction :\n```json\n{trimmed},\n}}\n```\nBonne journée !");
    let model = Scripted::answering(ModelResponse::text(text));

    let output = extract_with_stats(png_document(), &config_for(model))
        .await
        .unwrap();
    assert_eq!(output.stats.channel, Channel::Text);
    assert_eq!(output.stats.recovery_stage, RecoveryStage::Repaired);
    assert_eq!(output.record.withholding_tax.amount, 140.0);
}

#[tokio::test]
async fn test_tool_call_preferred_over_text() {
    let mut response = ModelResponse::tool_call("submit_payslip", sample_json());
    response.text = Some(sample_json().replace("Jeanne Martin", "Texte Libre"));
    let model = Scripted::answering(response);

    let record = extract(png_document(), &config_for(model)).await.unwrap();
    assert_eq!(record.employee_name, "Jeanne Martin");
}

#[tokio::test]
async fn test_missing_category_is_a_schema_defect() {
    let mut value: serde_json::Value = serde_json::from_str(&sample_json()).unwrap();
    value["employeeContributions"]
        .as_object_mut()
        .unwrap()
        .remove("csgCrds");
    let model = Scripted::answering(ModelResponse::text(value.to_string()));

    let err = extract(png_document(), &config_for(model)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaDefect);
    match err {
        ExtractionError::SchemaDefect(d) => {
            assert_eq!(d.path, "employeeContributions.csgCrds");
            assert_eq!(d.reason, DefectReason::Missing);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_prose_answer_is_no_parsable_json() {
    let model = Scripted::answering(ModelResponse::text(
        "Je suis désolé, l'image est illisible.",
    ));
    let err = extract(png_document(), &config_for(model)).await.unwrap_err();
    match err {
        ExtractionError::NoParsableJson { raw_text } => {
            assert!(raw_text.contains("illisible"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unsupported_format_never_calls_model() {
    let model = Scripted::answering(ModelResponse::text(sample_json()));
    let doc = RawDocument::new(b"hello".to_vec(), MediaType::from_mime("text/plain"));

    let err = extract(doc, &config_for(model.clone())).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_empty_document_is_render_failure() {
    let model = Scripted::answering(ModelResponse::text(sample_json()));
    let doc = RawDocument::new(Vec::new(), MediaType::Png);
    let err = extract(doc, &config_for(model)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RenderFailure);
}

#[tokio::test]
async fn test_jpeg_input_is_normalised() {
    let model = Scripted::answering(ModelResponse::tool_call("submit_payslip", sample_json()));
    let doc = RawDocument::from_bytes(payslip_image(ImageFormat::Jpeg));
    assert_eq!(doc.media_type(), &MediaType::Jpeg);

    let output = extract_with_stats(doc, &config_for(model)).await.unwrap();
    assert_eq!(output.stats.image_width, 60);
}

#[tokio::test]
async fn test_upstream_failure_is_surfaced_once() {
    let model = Scripted::failing(|| ExtractionError::UpstreamFailure {
        provider: "scripted".into(),
        detail: "HTTP 500".into(),
    });
    let err = extract(png_document(), &config_for(model.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    assert_eq!(model.calls(), 1, "no retries");
}

#[tokio::test]
async fn test_model_timeout() {
    let model = Scripted::slow(Duration::from_secs(10));
    let config = ExtractionConfig::builder()
        .vision_model(model)
        .api_timeout_secs(1)
        .build()
        .unwrap();
    let err = extract(png_document(), &config).await.unwrap_err();
    assert!(matches!(err, ExtractionError::UpstreamTimeout { secs: 1 }));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("start {:?}", stage));
    }
    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("done {:?}", stage));
    }
    fn on_failure(&self, stage: Stage, _message: &str) {
        self.events.lock().unwrap().push(format!("fail {:?}", stage));
    }
}

#[tokio::test]
async fn test_progress_events_follow_the_pipeline() {
    let recorder = Arc::new(Recorder::default());
    let model = Scripted::answering(ModelResponse::text("pas de JSON ici"));
    let config = ExtractionConfig::builder()
        .vision_model(model)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    assert!(extract(png_document(), &config).await.is_err());
    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "start Normalize",
            "done Normalize",
            "start BuildRequest",
            "done BuildRequest",
            "start ModelCall",
            "done ModelCall",
            "start Recover",
            "fail Recover",
        ]
    );
}

#[test]
fn test_extract_sync() {
    let model = Scripted::answering(ModelResponse::tool_call("submit_payslip", sample_json()));
    let output = extract_sync(png_document(), &config_for(model)).unwrap();
    assert_eq!(output.record.period, "janvier 2024");
}

#[tokio::test]
async fn test_extract_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bulletin.png");
    std::fs::write(&path, payslip_image(ImageFormat::Png)).unwrap();

    let model = Scripted::answering(ModelResponse::tool_call("submit_payslip", sample_json()));
    let output = extract_file(&path, &config_for(model)).await.unwrap();
    assert_eq!(output.record.employee_contributions.total, 660.0);

    let err = extract_file(dir.path().join("absent.pdf"), &ExtractionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_vision_model_is_send_sync() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn VisionModel>();
    assert_send_sync::<ExtractionConfig>();
}

// ── Live tests (E2E_ENABLED) ─────────────────────────────────────────────────

#[tokio::test]
async fn test_live_payslip_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("payslip.pdf"));

    let output = extract_file(&path, &ExtractionConfig::default())
        .await
        .expect("live extraction failed");
    println!(
        "{} / {}: {} in, {} out tokens via {}",
        output.record.employee_name,
        output.record.period,
        output.stats.input_tokens,
        output.stats.output_tokens,
        output.stats.backend
    );

    let waterfall = reconcile(&output.record);
    assert!(waterfall.super_gross > 0.0);
    for d in &waterfall.discrepancies {
        println!("discrepancy: {} reported {} computed {}", d.path, d.reported, d.computed);
    }
    assert!(!waterfall.narrative().is_empty());
}

#[tokio::test]
async fn test_live_payslip_free_text_mode() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("payslip.pdf"));

    let config = ExtractionConfig::builder()
        .response_mode(payslip_waterfall::ResponseMode::FreeText)
        .build()
        .unwrap();
    let output = extract_file(&path, &config)
        .await
        .expect("live extraction failed");
    assert_eq!(output.stats.channel, Channel::Text);
}
