//! Error types for the edgequake-doctriage library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TriageError`] — **Fatal** to one unit of work: the ingestion, OCR or
//!   analysis job cannot finish (corrupt PDF, missing document, OCR upload
//!   rejected). Returned as `Err(TriageError)` and surfaced to the job queue,
//!   which owns retry policy.
//!
//! * [`ModelError`] — **Absorbed**: a language-model call failed (timeout,
//!   non-2xx, garbage response). It never leaves the scan detector or the
//!   semantic analyzer; each call site degrades to a local heuristic or a
//!   sentinel value so the pipeline keeps moving.

use crate::model::{DocumentId, PageId};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doctriage library.
#[derive(Debug, Error)]
pub enum TriageError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt, or a page could not be read.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Page number does not exist in the source PDF.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: usize },

    /// pdfium-render returned an error while rasterising a page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR service answered with a non-2xx status.
    #[error("OCR failed for page {page}: HTTP {status} - {body}")]
    OcrFailed { page: PageId, status: u16, body: String },

    /// The OCR request never got an HTTP answer (DNS, TLS, timeout…).
    #[error("OCR request for page {page} failed: {detail}")]
    OcrTransport { page: PageId, detail: String },

    // ── Lookup errors ─────────────────────────────────────────────────────
    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    // ── Persistence ───────────────────────────────────────────────────────
    /// The document store rejected a write.
    #[error("Store error: {0}")]
    Store(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured language-model provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TriageError {
    /// True for errors raised before any page could be read from the file.
    pub fn is_ingestion_error(&self) -> bool {
        matches!(
            self,
            TriageError::FileNotFound { .. }
                | TriageError::PermissionDenied { .. }
                | TriageError::NotAPdf { .. }
                | TriageError::CorruptPdf { .. }
                | TriageError::PasswordRequired { .. }
                | TriageError::WrongPassword { .. }
                | TriageError::PdfiumBindingFailed(_)
        )
    }
}

/// A failed language-model call.
///
/// Never returned from the public pipeline operations; see the module docs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model transport error: {0}")]
    Transport(String),

    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("provider error: {0}")]
    Provider(String),
}
