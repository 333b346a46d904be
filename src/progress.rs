//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn TriageProgressCallback>`] via
//! [`crate::config::TriageConfigBuilder::progress_callback`] to receive
//! events as ingestion, OCR and the analysis loops work through a document.
//! The CLI forwards them to an `indicatif` progress bar; a service would
//! forward them to its own telemetry.

use crate::model::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Ingest,
    Ocr,
    Classify,
    ExtractMaterials,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "ingest",
            Stage::Ocr => "ocr",
            Stage::Classify => "classify",
            Stage::ExtractMaterials => "extract",
        };
        f.pad(name)
    }
}

/// Called by the pipeline as it works through pages.
///
/// All methods default to no-ops. OCR units of work for different pages run
/// concurrently, so implementations must be `Send + Sync` and protect their
/// own shared state.
pub trait TriageProgressCallback: Send + Sync {
    /// A stage begins on `document`, which has `total_pages` pages.
    fn on_stage_start(&self, stage: Stage, document: DocumentId, total_pages: usize) {
        let _ = (stage, document, total_pages);
    }

    /// A page (1-indexed) finished the stage.
    fn on_page_complete(&self, stage: Stage, page_num: u32) {
        let _ = (stage, page_num);
    }

    /// A page was skipped because it had no text to analyse.
    fn on_page_skipped(&self, stage: Stage, page_num: u32) {
        let _ = (stage, page_num);
    }

    /// A page failed the stage.
    fn on_page_error(&self, stage: Stage, page_num: u32, error: &str) {
        let _ = (stage, page_num, error);
    }

    /// The stage finished on `document`; `processed` pages were handled.
    fn on_stage_complete(&self, stage: Stage, document: DocumentId, processed: usize) {
        let _ = (stage, document, processed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TriageProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TriageConfig`].
pub type ProgressCallback = Arc<dyn TriageProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        completes: AtomicUsize,
        skips: AtomicUsize,
    }

    impl TriageProgressCallback for Counting {
        fn on_page_complete(&self, _stage: Stage, _page_num: u32) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_skipped(&self, _stage: Stage, _page_num: u32) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Ingest, DocumentId(1), 3);
        cb.on_page_complete(Stage::Ingest, 1);
        cb.on_page_error(Stage::Ocr, 2, "boom");
        cb.on_stage_complete(Stage::Ingest, DocumentId(1), 3);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let cb = Arc::new(Counting::default());
        let dyn_cb: ProgressCallback = cb.clone();
        dyn_cb.on_page_complete(Stage::Classify, 1);
        dyn_cb.on_page_complete(Stage::Classify, 2);
        dyn_cb.on_page_skipped(Stage::Classify, 3);
        assert_eq!(cb.completes.load(Ordering::SeqCst), 2);
        assert_eq!(cb.skips.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::ExtractMaterials.to_string(), "extract");
        assert_eq!(Stage::Ocr.to_string(), "ocr");
    }
}
