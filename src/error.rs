//! Error types for the payslip-waterfall library.
//!
//! Every failure in the extraction pipeline is terminal for the current
//! attempt: nothing is retried or patched locally. Errors are split in two:
//!
//! * [`ExtractionError`]: the single fatal error returned by
//!   [`crate::extract`] and friends. Each variant maps onto one
//!   [`ErrorKind`] so a caller can show exactly one human-readable message
//!   per failure kind.
//!
//! * [`SchemaDefect`]: the first contract violation found in a recovered
//!   JSON object, with the dotted path of the offending field and a reason.
//!   Wrapped in [`ExtractionError::SchemaDefect`] when it ends an extraction.
//!
//! Diagnostic detail (raw model text, field paths) lives in the error values
//! and in `tracing` output. The source document never appears in either.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of raw model text shown in `Display`.
const RAW_PREVIEW_CHARS: usize = 200;

/// All fatal errors returned by the payslip-waterfall library.
#[derive(Debug, Error)]
pub enum ExtractionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Payslip file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The declared media type is neither a supported image nor a PDF.
    #[error("Unsupported document format '{media_type}'\nSupported: PDF, PNG, JPEG.")]
    UnsupportedFormat { media_type: String },

    /// The document could not be turned into a raster image
    /// (corrupt PDF, zero pages, undecodable image).
    #[error("Could not render the document: {detail}")]
    RenderFailure { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
(or pass --pdfium-lib) to point at an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Upstream model errors ─────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model call itself failed.
    #[error("LLM call to '{provider}' failed: {detail}")]
    UpstreamFailure { provider: String, detail: String },

    /// The model call did not answer within the configured timeout.
    #[error("LLM call timed out after {secs}s\nIncrease --api-timeout.")]
    UpstreamTimeout { secs: u64 },

    /// The provider returned HTTP 429. Retry policy belongs to the caller.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    // ── Response errors ───────────────────────────────────────────────────
    /// No well-formed JSON object could be recovered from the model output.
    ///
    /// `raw_text` keeps the pre-repair candidate for diagnostics.
    #[error("No parsable JSON object in the model response (starts with: {:?})", preview(.raw_text))]
    NoParsableJson { raw_text: String },

    /// The recovered object does not satisfy the payslip contract.
    #[error("Extracted payslip is incomplete: {0}")]
    SchemaDefect(#[from] SchemaDefect),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        let mut head: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
        head.push('…');
        head
    } else {
        text.to_string()
    }
}

/// Coarse failure classes, one user-visible message each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    RenderFailure,
    UpstreamFailure,
    NoParsableJson,
    SchemaDefect,
    Configuration,
    Io,
    Internal,
}

impl ErrorKind {
    /// The single message shown to an end user for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => {
                "Format non pris en charge : utilisez un PDF ou une image (JPG, PNG)."
            }
            ErrorKind::RenderFailure => "Impossible de convertir le PDF en image.",
            ErrorKind::UpstreamFailure => {
                "Le service d'analyse est indisponible. Réessayez dans quelques instants."
            }
            ErrorKind::NoParsableJson | ErrorKind::SchemaDefect => {
                "Une erreur est survenue lors de l'analyse de la fiche de paie."
            }
            ErrorKind::Configuration => "Configuration invalide.",
            ErrorKind::Io => "Impossible de lire le fichier.",
            ErrorKind::Internal => "Erreur interne.",
        }
    }
}

impl ExtractionError {
    /// Classify this error for user-facing reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::FileNotFound { .. } | ExtractionError::PermissionDenied { .. } => {
                ErrorKind::Io
            }
            ExtractionError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            ExtractionError::RenderFailure { .. } => ErrorKind::RenderFailure,
            ExtractionError::UpstreamFailure { .. }
            | ExtractionError::UpstreamTimeout { .. }
            | ExtractionError::RateLimitExceeded { .. } => ErrorKind::UpstreamFailure,
            ExtractionError::NoParsableJson { .. } => ErrorKind::NoParsableJson,
            ExtractionError::SchemaDefect(_) => ErrorKind::SchemaDefect,
            ExtractionError::PdfiumBindingFailed(_)
            | ExtractionError::ProviderNotConfigured { .. }
            | ExtractionError::InvalidConfig(_) => ErrorKind::Configuration,
            ExtractionError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum DefectReason {
    /// Required field absent (or `null`).
    Missing,
    /// Present but of the wrong JSON kind.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// A contribution line with a blank `name`.
    EmptyName,
    /// A salary figure that must not be negative.
    Negative,
}

impl fmt::Display for DefectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefectReason::Missing => f.write_str("missing"),
            DefectReason::WrongType { expected, found } => {
                write!(f, "wrong-type (expected {expected}, found {found})")
            }
            DefectReason::EmptyName => f.write_str("empty-name"),
            DefectReason::Negative => f.write_str("negative"),
        }
    }
}

/// The first contract violation found in a recovered object.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("{path}: {reason}")]
pub struct SchemaDefect {
    /// Dotted path of the offending field, e.g. `employerContributions.health.total`.
    pub path: String,
    pub reason: DefectReason,
}

impl SchemaDefect {
    pub fn new(path: impl Into<String>, reason: DefectReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defect_display() {
        let d = SchemaDefect::new("employeeContributions.csgCrds", DefectReason::Missing);
        assert_eq!(d.to_string(), "employeeContributions.csgCrds: missing");
    }

    #[test]
    fn wrong_type_display() {
        let d = SchemaDefect::new(
            "grossSalary",
            DefectReason::WrongType {
                expected: "number",
                found: "string",
            },
        );
        assert_eq!(
            d.to_string(),
            "grossSalary: wrong-type (expected number, found string)"
        );
    }

    #[test]
    fn no_parsable_json_display_is_bounded() {
        let e = ExtractionError::NoParsableJson {
            raw_text: "x".repeat(5000),
        };
        let msg = e.to_string();
        assert!(msg.len() < 400, "got {} bytes", msg.len());
        assert!(msg.contains('…'));
    }

    #[test]
    fn kinds_cover_the_taxonomy() {
        assert_eq!(
            ExtractionError::UnsupportedFormat {
                media_type: "text/plain".into()
            }
            .kind(),
            ErrorKind::UnsupportedFormat
        );
        assert_eq!(
            ExtractionError::UpstreamTimeout { secs: 30 }.kind(),
            ErrorKind::UpstreamFailure
        );
        let defect: ExtractionError =
            SchemaDefect::new("period", DefectReason::EmptyName).into();
        assert_eq!(defect.kind(), ErrorKind::SchemaDefect);
        assert!(!defect.kind().user_message().is_empty());
    }

    #[test]
    fn rate_limit_display() {
        let e = ExtractionError::RateLimitExceeded {
            provider: "openai".into(),
            retry_after_secs: Some(60),
        };
        assert!(e.to_string().contains("openai"));
    }
}
