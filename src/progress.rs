//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow an
//! extraction as it moves through the pipeline. The callback only ever sees
//! stage names, timings and error messages: never the document, the image or
//! the model text.
//!
//! # Example
//!
//! ```rust
//! use payslip_waterfall::{ExtractionConfig, ExtractionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct Logger;
//!
//! impl ExtractionProgressCallback for Logger {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{} done in {}ms", stage.label(), elapsed_ms);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Logger))
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::sync::Arc;

/// One step of the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    /// Document → single raster image.
    Normalize,
    /// Image + contract → model request.
    BuildRequest,
    /// The upstream model call.
    ModelCall,
    /// Model output → JSON object.
    Recover,
    /// JSON object → validated record.
    Validate,
}

impl Stage {
    /// Short human label, used by the CLI spinner.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Normalize => "Rendering document",
            Stage::BuildRequest => "Preparing request",
            Stage::ModelCall => "Reading payslip",
            Stage::Recover => "Recovering JSON",
            Stage::Validate => "Validating fields",
        }
    }
}

/// Called by the extraction pipeline as it enters and leaves each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once when a stage ends the extraction with an error.
    fn on_failure(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start {stage:?}"));
        }

        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("done {stage:?}"));
        }

        fn on_failure(&self, stage: Stage, _message: &str) {
            self.events.lock().unwrap().push(format!("fail {stage:?}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Normalize);
        cb.on_stage_complete(Stage::Normalize, 12);
        cb.on_failure(Stage::Recover, "no json");
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::ModelCall);
        rec.on_stage_complete(Stage::ModelCall, 900);
        rec.on_stage_start(Stage::Recover);
        rec.on_failure(Stage::Recover, "boom");
        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "start ModelCall",
                "done ModelCall",
                "start Recover",
                "fail Recover"
            ]
        );
    }

    #[test]
    fn every_stage_has_a_label() {
        for s in [
            Stage::Normalize,
            Stage::BuildRequest,
            Stage::ModelCall,
            Stage::Recover,
            Stage::Validate,
        ] {
            assert!(!s.label().is_empty());
        }
    }
}
