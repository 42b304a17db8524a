//! Input resolution: turn a caller-supplied file or buffer into a [`RawDocument`].
//!
//! Documents are held in memory only. pdfium can load straight from a byte
//! slice, so nothing is ever copied to a temporary file: when the
//! `RawDocument` is dropped, the payslip is gone.
//!
//! The media type is taken from magic bytes first (`%PDF`, the PNG signature,
//! the JPEG SOI marker) and from the file extension only when the bytes are
//! inconclusive. A wrong extension therefore never sends a PDF to the image
//! decoder or vice versa.

use crate::error::ExtractionError;
use std::fmt;
use std::path::Path;
use tracing::debug;

const PDF_MAGIC: &[u8] = b"%PDF";
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Declared kind of a raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    /// Anything else, kept verbatim so the error can name it.
    Other(String),
}

impl MediaType {
    /// Parse a MIME type string.
    pub fn from_mime(mime: &str) -> Self {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => MediaType::Pdf,
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" | "image/pjpeg" => MediaType::Jpeg,
            other => MediaType::Other(other.to_string()),
        }
    }

    /// Detect the media type from the leading bytes, if recognisable.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PDF_MAGIC) {
            Some(MediaType::Pdf)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(MediaType::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(MediaType::Jpeg)
        } else {
            None
        }
    }

    /// Guess from a file extension.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => MediaType::Pdf,
            "png" => MediaType::Png,
            "jpg" | "jpeg" => MediaType::Jpeg,
            "" => MediaType::Other("application/octet-stream".to_string()),
            other => MediaType::Other(format!("*.{other}")),
        }
    }

    /// The MIME string for this type.
    pub fn mime(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Other(s) => s,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An input document: opaque bytes plus their declared media type.
///
/// Consumed once by [`crate::pipeline::normalize::normalize`].
#[derive(Clone)]
pub struct RawDocument {
    bytes: Vec<u8>,
    media_type: MediaType,
}

// Never print the payload.
impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RawDocument {
    /// Wrap an in-memory document with a caller-declared media type.
    pub fn new(bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self { bytes, media_type }
    }

    /// Wrap an in-memory document, sniffing its type from magic bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let media_type = MediaType::sniff(&bytes)
            .unwrap_or_else(|| MediaType::Other("application/octet-stream".to_string()));
        Self { bytes, media_type }
    }

    /// Read a local file into memory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractionError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => ExtractionError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ExtractionError::Internal(format!("read {}: {e}", path.display())),
        })?;

        let media_type = MediaType::sniff(&bytes).unwrap_or_else(|| MediaType::from_extension(path));
        debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            bytes.len(),
            media_type
        );
        Ok(Self { bytes, media_type })
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
