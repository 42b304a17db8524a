//! Image encoding: `DynamicImage` → PNG bytes wrapped in a [`NormalizedImage`].
//!
//! Vision APIs accept images as base64 data-URIs embedded in the JSON request
//! body. PNG is lossless: JPEG artefacts on small printed digits are exactly
//! what turns `1 234,56` into `1 284,56`. Every input, including JPEG scans,
//! is re-encoded to PNG so the rest of the pipeline sees one canonical form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// A single raster image ready to embed in a model request.
///
/// Request-scoped: built by the normaliser, borrowed by the request, dropped
/// with it.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    png: Vec<u8>,
}

// Never print the pixels.
impl fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_len", &self.png.len())
            .finish()
    }
}

impl NormalizedImage {
    pub const MIME_TYPE: &'static str = "image/png";

    /// PNG-encoded bytes.
    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    /// Base64 of the PNG bytes.
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// `data:image/png;base64,…` form accepted by OpenAI-style APIs.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", Self::MIME_TYPE, self.base64())
    }

    /// The edgequake-llm attachment for this image.
    ///
    /// `detail: "high"` lets GPT-4-class models tile the full page; at
    /// `"low"` the contribution table collapses into one 512 px overview.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64(), Self::MIME_TYPE).with_detail("high")
    }
}

/// Encode a raster image as PNG.
pub fn encode_image(img: &DynamicImage) -> Result<NormalizedImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );

    Ok(NormalizedImage {
        width: img.width(),
        height: img.height(),
        png: buf,
    })
}
