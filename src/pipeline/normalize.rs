//! Document normalisation: any supported input → one [`NormalizedImage`].
//!
//! | Input | Path |
//! |-------|------|
//! | PNG / JPEG | decode, re-encode as PNG |
//! | PDF | render page one via pdfium, encode as PNG |
//! | anything else | [`ExtractionError::UnsupportedFormat`] |
//!
//! The type is checked before pdfium is bound, so an unsupported upload
//! fails fast even on a machine without libpdfium.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::pipeline::encode::{encode_image, NormalizedImage};
use crate::pipeline::input::{MediaType, RawDocument};
use crate::pipeline::render;
use image::ImageFormat;
use tracing::info;

/// Convert a raw document into a single embeddable raster image.
///
/// Consumes the document: once normalised, the original bytes are dropped.
pub fn normalize(
    doc: RawDocument,
    config: &ExtractionConfig,
) -> Result<NormalizedImage, ExtractionError> {
    let media_type = doc.media_type().clone();
    if doc.is_empty() {
        return Err(ExtractionError::RenderFailure {
            detail: "document is empty".to_string(),
        });
    }

    let image = match media_type {
        MediaType::Png | MediaType::Jpeg => {
            let format = if media_type == MediaType::Png {
                ImageFormat::Png
            } else {
                ImageFormat::Jpeg
            };
            image::load_from_memory_with_format(doc.bytes(), format).map_err(|e| {
                ExtractionError::RenderFailure {
                    detail: format!("cannot decode {media_type} image: {e}"),
                }
            })?
        }
        MediaType::Pdf => {
            let pdfium = render::bind_pdfium(config.pdfium_lib_path.as_deref())?;
            render::render_first_page(
                &pdfium,
                doc.bytes(),
                config.render_scale,
                config.max_rendered_pixels,
            )?
        }
        MediaType::Other(ref mime) => {
            return Err(ExtractionError::UnsupportedFormat {
                media_type: mime.clone(),
            });
        }
    };
    drop(doc);

    let normalized = encode_image(&image).map_err(|e| ExtractionError::RenderFailure {
        detail: format!("PNG encoding failed: {e}"),
    })?;
    info!(
        "Normalised {} → {}x{} PNG",
        media_type, normalized.width, normalized.height
    );
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 16, Rgb([200, 200, 200])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn png_passes_through() {
        let doc = RawDocument::new(encoded(ImageFormat::Png), MediaType::Png);
        let img = normalize(doc, &ExtractionConfig::default()).unwrap();
        assert_eq!((img.width, img.height), (24, 16));
    }

    #[test]
    fn jpeg_is_reencoded_as_png() {
        let doc = RawDocument::from_bytes(encoded(ImageFormat::Jpeg));
        assert_eq!(doc.media_type(), &MediaType::Jpeg);
        let img = normalize(doc, &ExtractionConfig::default()).unwrap();
        assert!(img.png_bytes().starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!((img.width, img.height), (24, 16));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let doc = RawDocument::new(b"GIF89a".to_vec(), MediaType::from_mime("image/gif"));
        let err = normalize(doc, &ExtractionConfig::default()).unwrap_err();
        assert!(
            matches!(err, ExtractionError::UnsupportedFormat { ref media_type } if media_type == "image/gif")
        );
    }

    #[test]
    fn corrupt_image_is_a_render_failure() {
        let doc = RawDocument::new(b"\x89PNG\r\n\x1a\nbroken".to_vec(), MediaType::Png);
        let err = normalize(doc, &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::RenderFailure { .. }));
    }

    #[test]
    fn empty_document_is_a_render_failure() {
        let doc = RawDocument::new(Vec::new(), MediaType::Pdf);
        let err = normalize(doc, &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, ExtractionError::RenderFailure { .. }));
    }
}
