//! Records produced and consumed by the pipeline.
//!
//! A [`Document`] owns its [`Page`]s; a page owns its [`TextBlock`]s and
//! [`Material`]s. Pages are numbered `1..=N` without gaps. The records are
//! plain data: persistence lives behind [`crate::store::DocumentStore`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Identifier of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

/// Identifier of a stored page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Where the stored file lives on disk.
    pub source: PathBuf,
    pub original_filename: String,
}

/// One page of a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub document_id: DocumentId,
    /// 1-based page number.
    pub number: u32,
    pub is_scanned: bool,
    /// Trimmed text embedded in the PDF; empty for image-only pages.
    pub raw_text: String,
    /// Text returned by the OCR service; empty until OCR ran.
    pub ocr_text: String,
    /// Page-type label; `None` until classification ran.
    pub classification: Option<String>,
    /// Page geometry in PDF points.
    pub width: f32,
    pub height: f32,
}

impl Page {
    /// Text fed to downstream analysis: the embedded text when present,
    /// otherwise the OCR text. Empty when neither is available.
    ///
    /// `raw_text` is trimmed at extraction; `ocr_text` is stored as the OCR
    /// service returned it, so whitespace-only OCR output counts as text.
    pub fn effective_text(&self) -> &str {
        if !self.raw_text.is_empty() {
            &self.raw_text
        } else {
            &self.ocr_text
        }
    }

    /// True when a scanned page has never received OCR text.
    pub fn needs_ocr(&self) -> bool {
        self.is_scanned && self.ocr_text.is_empty()
    }
}

/// Axis-aligned box in PDF points, origin at the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Area of the box; degenerate or inverted boxes have zero area.
    pub fn area(&self) -> f32 {
        (self.x1 - self.x0).max(0.0) * (self.y1 - self.y0).max(0.0)
    }
}

/// A positioned fragment of native text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub page_id: PageId,
    pub bbox: BoundingBox,
    pub text: String,
}

/// A material found on a page, with free-form characteristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub page_id: PageId,
    pub name: String,
    pub characteristics: BTreeMap<String, String>,
}

/// A page ready to be persisted, before the store assigns identifiers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewPage {
    pub number: u32,
    pub is_scanned: bool,
    pub raw_text: String,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<NewTextBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTextBlock {
    pub bbox: BoundingBox,
    pub text: String,
}

/// A material as returned by extraction, before it is attached to a page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    pub characteristics: BTreeMap<String, String>,
}

/// Page-count summary of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total_pages: usize,
    pub text_pages: usize,
    pub scanned_pages: usize,
    pub text_percentage: f64,
    pub scanned_percentage: f64,
    /// Label → number of pages; unclassified pages are not counted.
    pub classification_counts: BTreeMap<String, usize>,
}

impl DocumentStats {
    pub fn from_pages(pages: &[Page]) -> Self {
        let total = pages.len();
        let scanned = pages.iter().filter(|p| p.is_scanned).count();
        let text = total - scanned;

        let mut classification_counts = BTreeMap::new();
        for label in pages.iter().filter_map(|p| p.classification.as_deref()) {
            *classification_counts.entry(label.to_string()).or_insert(0) += 1;
        }

        Self {
            total_pages: total,
            text_pages: text,
            scanned_pages: scanned,
            text_percentage: percentage(text, total),
            scanned_percentage: percentage(scanned, total),
            classification_counts,
        }
    }
}

/// `part / total` as a percentage rounded to two decimals; 0 for an empty total.
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
