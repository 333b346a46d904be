//! Pipeline stages for document triage.
//!
//! Each submodule implements one step. External collaborators (pdfium, the
//! OCR service, the language model, the verdict cache) sit behind traits so
//! each step can be tested with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ scan ──┬─────────────────────────▶ process ──▶ analyze
//! (%PDF)    (pdfium)   (rules, │                           (page loop)  (llm)
//!                      cache,  └─▶ render ──▶ ocr ──────────▲
//!                      llm)       (pdfium)   (HTTP upload)
//! ```
//!
//! 1. [`input`]   — check the stored file exists and starts with `%PDF`
//! 2. [`extract`] — read text, geometry and layout blocks of every page;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`scan`]    — decide scanned vs native per page; the model tier goes
//!    through [`llm`] and is memoised in [`cache`]
//! 4. [`render`] + [`ocr`] — rasterise a scanned page and upload it for
//!    recognition
//! 5. [`process`] — walk a document's pages in order and apply an
//!    [`analyze`] operation to each page with text

pub mod analyze;
pub mod cache;
pub mod extract;
#[cfg(test)]
mod http_stub;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod pdfium;
pub mod process;
pub mod render;
pub mod scan;
