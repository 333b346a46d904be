//! Page rasterisation for OCR: render one page to a temporary PNG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! `tokio::task::spawn_blocking` keeps that work off the async worker threads
//! so concurrent OCR jobs don't stall each other's network I/O.
//!
//! ## DPI and the pixel cap
//!
//! Pages render at `dpi / 72` pixels per point. The longest edge is capped
//! at [`MAX_RENDER_EDGE`] so an oversized sheet (A0 at 300 DPI is roughly
//! 10,000 × 14,000 px) can't exhaust memory.

use crate::error::TriageError;
use crate::pipeline::pdfium::{bind_pdfium, map_load_error};
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Longest rendered edge in pixels.
pub const MAX_RENDER_EDGE: i32 = 8000;

/// Renders a single page of a PDF to an image file.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render 1-based `page_number` of `source` at `dpi`.
    ///
    /// The returned file is deleted when dropped.
    async fn rasterize(
        &self,
        source: &Path,
        page_number: u32,
        dpi: u32,
    ) -> Result<NamedTempFile, TriageError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        source: &Path,
        page_number: u32,
        dpi: u32,
    ) -> Result<NamedTempFile, TriageError> {
        let path: PathBuf = source.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            rasterize_blocking(&path, page_number, dpi, password.as_deref())
        })
        .await
        .map_err(|e| TriageError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Blocking implementation of page rendering.
fn rasterize_blocking(
    pdf_path: &Path,
    page_number: u32,
    dpi: u32,
    password: Option<&str>,
) -> Result<NamedTempFile, TriageError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| map_load_error(e, pdf_path, password))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    let index = page_index(page_number, total)?;

    let page = pages
        .get(index)
        .map_err(|e| TriageError::RasterisationFailed {
            page: page_number,
            detail: format!("{:?}", e),
        })?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDER_EDGE)
        .set_maximum_height(MAX_RENDER_EDGE);

    let bitmap =
        page.render_with_config(&render_config)
            .map_err(|e| TriageError::RasterisationFailed {
                page: page_number,
                detail: format!("{:?}", e),
            })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} at {} dpi → {}x{} px",
        page_number,
        dpi,
        image.width(),
        image.height()
    );

    let file = tempfile::Builder::new()
        .prefix("doctriage-page-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| TriageError::Internal(format!("Cannot create temp file: {}", e)))?;

    image
        .save_with_format(file.path(), ImageFormat::Png)
        .map_err(|e| TriageError::RasterisationFailed {
            page: page_number,
            detail: format!("PNG encoding failed: {}", e),
        })?;

    Ok(file)
}

/// Map a 1-based page number onto pdfium's 0-based `u16` index.
fn page_index(page_number: u32, total: usize) -> Result<u16, TriageError> {
    if page_number == 0 || page_number as usize > total {
        return Err(TriageError::PageOutOfRange {
            page: page_number,
            total,
        });
    }
    u16::try_from(page_number - 1).map_err(|_| TriageError::PageOutOfRange {
        page: page_number,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_is_zero_based() {
        assert_eq!(page_index(1, 3).unwrap(), 0);
        assert_eq!(page_index(3, 3).unwrap(), 2);
    }

    #[test]
    fn page_index_rejects_zero_and_past_the_end() {
        assert!(matches!(
            page_index(0, 3),
            Err(TriageError::PageOutOfRange { page: 0, total: 3 })
        ));
        assert!(matches!(
            page_index(4, 3),
            Err(TriageError::PageOutOfRange { page: 4, total: 3 })
        ));
    }
}
