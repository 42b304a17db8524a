//! PDF rasterisation: render the first page of a payslip via pdfium.
//!
//! Only page one is ever rendered. Multi-page statements are not supported;
//! the rest of the document is ignored rather than rejected.
//!
//! The page is scaled by a fixed factor (default 2×) and then capped at
//! `max_rendered_pixels` on either edge, so small print stays legible while
//! an oversized page cannot blow up memory.
//!
//! pdfium is CPU-bound and not async-safe; async callers go through
//! [`crate::extract`], which runs this in `spawn_blocking`.

use crate::error::ExtractionError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Bind to pdfium: an explicit library path if given, else the system library.
pub fn bind_pdfium(lib_path: Option<&Path>) -> Result<Pdfium, ExtractionError> {
    let bindings = match lib_path {
        Some(path) => Pdfium::bind_to_library(path.display().to_string()),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractionError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Rasterise page one of an in-memory PDF.
pub fn render_first_page(
    pdfium: &Pdfium,
    bytes: &[u8],
    scale: f32,
    max_pixels: u32,
) -> Result<DynamicImage, ExtractionError> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                ExtractionError::RenderFailure {
                    detail: "PDF is password-protected".to_string(),
                }
            } else {
                ExtractionError::RenderFailure {
                    detail: format!("corrupt PDF: {err_str}"),
                }
            }
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(ExtractionError::RenderFailure {
            detail: "PDF has no pages".to_string(),
        });
    }
    info!("PDF loaded: {} pages, rendering page 1", total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages.get(0).map_err(|e| ExtractionError::RenderFailure {
        detail: format!("page 1: {:?}", e),
    })?;

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractionError::RenderFailure {
            detail: format!("page 1: {:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page 1 at {}x → {}x{} px",
        scale,
        image.width(),
        image.height()
    );

    Ok(image)
}
