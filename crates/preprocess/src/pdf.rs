//! PDF rasterization through pdfium

use crate::PreprocessError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// Render the first page of a PDF at `dpi`
pub fn render_first_page(bytes: &[u8], dpi: f32) -> Result<DynamicImage, PreprocessError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PreprocessError::BackendUnavailable(format!("pdfium: {e}")))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| PreprocessError::Decode(format!("Failed to load PDF: {e}")))?;
    let page_count = document.pages().len();
    let page = document
        .pages()
        .get(0)
        .map_err(|e| PreprocessError::Decode(format!("PDF has no pages: {e}")))?;

    // PDF points are 72 per inch
    let scale = dpi / 72.0;
    let pixel_width = (page.width().value * scale) as i32;
    let pixel_height = (page.height().value * scale) as i32;
    debug!(
        "Rendering page 1/{} at {} dpi ({}x{})",
        page_count, dpi, pixel_width, pixel_height
    );

    let bitmap = page
        .render_with_config(
            &PdfRenderConfig::new()
                .set_target_width(pixel_width)
                .set_target_height(pixel_height)
                .render_form_data(true)
                .render_annotations(true),
        )
        .map_err(|e| PreprocessError::Transform(format!("Failed to render PDF page: {e}")))?;

    Ok(bitmap.as_image())
}
