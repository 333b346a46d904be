//! Page extraction: open a PDF and read each page's geometry, embedded text
//! and positioned layout blocks.
//!
//! Extraction is all-or-nothing per document. A failure on any page aborts
//! the whole call and no partial page list is returned, so ingestion never
//! commits half a document.
//!
//! pdfium places the origin at the bottom-left of the page; blocks are
//! converted to a top-left origin so `y0 < y1` reads top to bottom.

use crate::error::TriageError;
use crate::model::{BoundingBox, NewTextBlock};
use crate::pipeline::pdfium::{bind_pdfium, map_load_error};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a layout block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Text,
    Image,
}

/// A positioned region of a page as reported by the PDF's layout model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralBlock {
    pub kind: BlockKind,
    pub bbox: BoundingBox,
    /// Trimmed text for [`BlockKind::Text`]; empty for images.
    pub text: String,
}

impl StructuralBlock {
    pub fn text(bbox: BoundingBox, text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Text,
            bbox,
            text: text.into(),
        }
    }

    pub fn image(bbox: BoundingBox) -> Self {
        Self {
            kind: BlockKind::Image,
            bbox,
            text: String::new(),
        }
    }
}

/// Everything read from one page during extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// 0-based position of the page inside the PDF.
    pub index: usize,
    /// Trimmed embedded text.
    pub raw_text: String,
    pub width: f32,
    pub height: f32,
    /// Layout blocks in reading order; whitespace-only text blocks are dropped.
    pub blocks: Vec<StructuralBlock>,
}

impl PageLayout {
    /// 1-based page number exposed to callers.
    pub fn number(&self) -> u32 {
        self.index as u32 + 1
    }

    /// Text blocks in the shape persisted alongside the page.
    pub fn text_blocks(&self) -> Vec<NewTextBlock> {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Text && !b.text.trim().is_empty())
            .map(|b| NewTextBlock {
                bbox: b.bbox,
                text: b.text.clone(),
            })
            .collect()
    }
}

/// Reads page layouts out of a PDF file.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Every page of the document in physical order, or an error.
    async fn extract(&self, path: &Path) -> Result<Vec<PageLayout>, TriageError>;
}

/// [`PageSource`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl PageSource for PdfiumExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<PageLayout>, TriageError> {
        let path: PathBuf = path.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || extract_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| TriageError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

/// Blocking implementation of page extraction.
fn extract_blocking(path: &Path, password: Option<&str>) -> Result<Vec<PageLayout>, TriageError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| map_load_error(e, path, password))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let corrupt = |index: usize, e: PdfiumError| TriageError::CorruptPdf {
        path: path.to_path_buf(),
        detail: format!("page {}: {:?}", index + 1, e),
    };

    let mut layouts = Vec::with_capacity(total);
    for (index, page) in pages.iter().enumerate() {
        let width = page.width().value;
        let height = page.height().value;

        let text = page.text().map_err(|e| corrupt(index, e))?;
        let raw_text = text.all().trim().to_string();

        let mut blocks = Vec::new();
        for segment in text.segments().iter() {
            let fragment = segment.text();
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            let b = segment.bounds();
            blocks.push(StructuralBlock::text(
                to_top_left(
                    b.left().value,
                    b.top().value,
                    b.right().value,
                    b.bottom().value,
                    height,
                ),
                fragment,
            ));
        }

        for object in page.objects().iter() {
            if object.object_type() != PdfPageObjectType::Image {
                continue;
            }
            let b = object.bounds().map_err(|e| corrupt(index, e))?;
            blocks.push(StructuralBlock::image(to_top_left(
                b.left().value,
                b.top().value,
                b.right().value,
                b.bottom().value,
                height,
            )));
        }

        debug!(
            "Extracted page {}: {} chars, {} blocks, {:.0}x{:.0} pt",
            index + 1,
            raw_text.chars().count(),
            blocks.len(),
            width,
            height
        );

        layouts.push(PageLayout {
            index,
            raw_text,
            width,
            height,
            blocks,
        });
    }

    Ok(layouts)
}

/// Convert a bottom-left-origin rectangle to a top-left-origin [`BoundingBox`].
fn to_top_left(left: f32, top: f32, right: f32, bottom: f32, page_height: f32) -> BoundingBox {
    BoundingBox::new(
        left.min(right),
        page_height - top.max(bottom),
        left.max(right),
        page_height - top.min(bottom),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based() {
        let layout = PageLayout {
            index: 0,
            raw_text: String::new(),
            width: 100.0,
            height: 100.0,
            blocks: vec![],
        };
        assert_eq!(layout.number(), 1);
    }

    #[test]
    fn text_blocks_skip_images_and_blank_fragments() {
        let layout = PageLayout {
            index: 2,
            raw_text: "hello".into(),
            width: 100.0,
            height: 100.0,
            blocks: vec![
                StructuralBlock::text(BoundingBox::new(0.0, 0.0, 10.0, 10.0), "hello"),
                StructuralBlock::text(BoundingBox::new(0.0, 10.0, 10.0, 20.0), "  "),
                StructuralBlock::image(BoundingBox::new(0.0, 20.0, 100.0, 100.0)),
            ],
        };
        let blocks = layout.text_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "hello");
    }

    #[test]
    fn rectangles_flip_to_top_left_origin() {
        // A 10pt strip at the very top of a 800pt page.
        let b = to_top_left(0.0, 800.0, 100.0, 790.0, 800.0);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 100.0, 10.0));
        assert_eq!(b.area(), 1000.0);
    }
}
