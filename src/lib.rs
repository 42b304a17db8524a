//! # payslip-waterfall
//!
//! Read a French payslip with a Vision Language Model and turn it into a
//! verified superGross → net waterfall.
//!
//! ## Why this crate?
//!
//! Payslips are dense tables whose layout changes with every payroll vendor.
//! Template-based parsers break on each new layout. This crate hands page one
//! of the document to a vision model together with a strict output contract,
//! then treats the answer as untrusted: it recovers the JSON from whatever
//! the model wrapped it in, validates every required category, and recomputes
//! the aggregates from leaf figures before any percentage is derived.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Normalise  first page → one PNG (pdfium, spawn_blocking)
//!  ├─ 2. Request    instructions + image + output contract
//!  ├─ 3. Model      forced function call, or free text via edgequake-llm
//!  ├─ 4. Recover    tool args → fenced block → brace slice → comma repair
//!  ├─ 5. Validate   PayslipRecord or the first SchemaDefect
//!  └─ 6. Reconcile  cascade + detailed views, % of recomputed superGross
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use payslip_waterfall::{extract, reconcile, ExtractionConfig, RawDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Strict tool-call backend when OPENAI_API_KEY is set.
//!     let config = ExtractionConfig::default();
//!     let record = extract(RawDocument::from_path("fiche.pdf")?, &config).await?;
//!     let waterfall = reconcile(&record);
//!     for entry in &waterfall.cascade {
//!         println!("{:<24} {:>10.2} € {:>5.1}%",
//!             entry.label, entry.amount, entry.percentage_of_super_gross);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `payslip` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! payslip-waterfall = { version = "0.1", default-features = false }
//! ```
//!
//! ## Privacy
//!
//! Nothing is written to disk. The document, the rendered image and the
//! model text live only for the duration of one call; the library holds no
//! process-wide state.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reconcile;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, ResponseMode};
pub use error::{DefectReason, ErrorKind, ExtractionError, SchemaDefect};
pub use extract::{
    extract, extract_file, extract_sync, extract_with_stats, recover_and_validate, resolve_model,
    ExtractionOutput, ExtractionStats,
};
pub use pipeline::encode::NormalizedImage;
pub use pipeline::input::{MediaType, RawDocument};
pub use pipeline::llm::{EdgequakeVisionModel, ModelResponse, ToolCall, VisionModel};
pub use pipeline::normalize::normalize;
pub use pipeline::openai::OpenAiToolModel;
pub use pipeline::recover::{recover, Channel, RecoveredJson, RecoveryStage};
pub use pipeline::request::{ExtractionRequest, ExtractionRequestBuilder, OutputContract};
pub use pipeline::validate::validate;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use reconcile::{
    reconcile, Bucket, DetailedEntry, Discrepancy, Headline, HeadlineFigure, ReconciledWaterfall,
    ShareSplit, View, WaterfallEntry,
};
pub use record::{
    ContributionCategory, ContributionLine, EmployeeContributions, EmployerContributions,
    PayslipRecord, WithholdingTax,
};
