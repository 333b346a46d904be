//! The operations exposed to the surrounding application.
//!
//! [`Triage`] wires the pipeline stages to a [`DocumentStore`] and a
//! [`JobQueue`]. Each operation takes an identifier and reports only success
//! or failure; results are observed through the store.
//!
//! ```text
//! register_document ─▶ Job::Ingest ─▶ ingest_document
//! dispatch_ocr      ─▶ Job::OcrPage × scanned pages ─▶ ocr_page
//! classify_document / extract_materials ─▶ PageProcessingLoop
//! ```

use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::jobs::{Job, JobHandle, JobQueue};
use crate::model::{Document, DocumentId, DocumentStats, NewPage, PageId};
use crate::pipeline::analyze::SemanticAnalyzer;
use crate::pipeline::cache::{MemoryVerdictCache, VerdictCache};
use crate::pipeline::extract::{PageSource, PdfiumExtractor};
use crate::pipeline::input;
use crate::pipeline::llm::{resolve_model, TextModel};
use crate::pipeline::ocr::{HttpOcrService, OcrDispatcher, OcrOutcome, OcrService};
use crate::pipeline::process::{PageOperation, PageProcessingLoop};
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::pipeline::scan::ScanDetector;
use crate::progress::Stage;
use crate::store::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// External collaborators of the pipeline.
///
/// [`Collaborators::from_config`] builds the production set; tests swap in
/// fakes field by field.
pub struct Collaborators {
    pub source: Arc<dyn PageSource>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub ocr: Arc<dyn OcrService>,
    pub model: Arc<dyn TextModel>,
    pub cache: Arc<dyn VerdictCache>,
}

impl Collaborators {
    /// pdfium for extraction and rendering, the HTTP OCR service, the
    /// resolved text model and an in-process verdict cache.
    pub fn from_config(config: &TriageConfig) -> Result<Self, TriageError> {
        Ok(Self {
            source: Arc::new(PdfiumExtractor::new(config.password.clone())),
            rasterizer: Arc::new(PdfiumRasterizer::new(config.password.clone())),
            ocr: Arc::new(HttpOcrService::from_config(config)?),
            model: resolve_model(config)?,
            cache: Arc::new(MemoryVerdictCache::new()),
        })
    }
}

/// Document triage service.
pub struct Triage {
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    source: Arc<dyn PageSource>,
    detector: ScanDetector,
    ocr: OcrDispatcher,
    pages: PageProcessingLoop,
    config: TriageConfig,
}

impl Triage {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
        collaborators: Collaborators,
        config: TriageConfig,
    ) -> Self {
        let Collaborators {
            source,
            rasterizer,
            ocr,
            model,
            cache,
        } = collaborators;

        let detector = ScanDetector::new(Arc::clone(&model), cache, config.clone());
        let ocr = OcrDispatcher::new(Arc::clone(&store), rasterizer, ocr, config.clone());
        let analyzer = Arc::new(SemanticAnalyzer::new(model, config.clone()));
        let pages = PageProcessingLoop::new(
            Arc::clone(&store),
            analyzer,
            config.progress_callback.clone(),
        );

        Self {
            store,
            queue,
            source,
            detector,
            ocr,
            pages,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Configuration the service was built with; workers draining the queue
    /// read `job_concurrency` from here.
    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    /// Record a stored PDF and queue its ingestion.
    pub async fn register_document(
        &self,
        source: impl Into<PathBuf>,
        original_filename: impl Into<String>,
    ) -> Result<(Document, JobHandle), TriageError> {
        let document = self
            .store
            .create_document(source.into(), original_filename.into())
            .await?;
        info!(document = %document.id, file = %document.original_filename, "Document registered");
        let handle = self.queue.submit(Job::Ingest(document.id));
        Ok((document, handle))
    }

    /// Extract every page of the document, decide scanned vs native per
    /// page and store the pages with their text blocks in one step.
    ///
    /// Returns the number of pages stored.
    pub async fn ingest_document(&self, id: DocumentId) -> Result<usize, TriageError> {
        let start = Instant::now();
        let document = self.store.get_document(id).await?;

        input::validate_pdf(&document.source)?;
        let layouts = self.source.extract(&document.source).await?;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(Stage::Ingest, id, layouts.len());
        }

        let mut pages = Vec::with_capacity(layouts.len());
        for layout in &layouts {
            let is_scanned = self.detector.is_scanned(layout).await;
            // Layout blocks are only kept for native pages.
            let blocks = if is_scanned {
                Vec::new()
            } else {
                layout.text_blocks()
            };
            pages.push(NewPage {
                number: layout.number(),
                is_scanned,
                raw_text: layout.raw_text.clone(),
                width: layout.width,
                height: layout.height,
                blocks,
            });
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_complete(Stage::Ingest, layout.number());
            }
        }

        let stored = self.store.replace_pages(id, pages).await?;
        let scanned = stored.iter().filter(|p| p.is_scanned).count();
        info!(
            document = %id,
            pages = stored.len(),
            scanned,
            "Ingested in {}ms",
            start.elapsed().as_millis()
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(Stage::Ingest, id, stored.len());
        }
        Ok(stored.len())
    }

    /// Queue one OCR job per scanned page still lacking OCR text.
    pub async fn dispatch_ocr(&self, id: DocumentId) -> Result<Vec<JobHandle>, TriageError> {
        let pages = self.store.pages(id).await?;
        let handles: Vec<JobHandle> = pages
            .iter()
            .filter(|p| p.needs_ocr())
            .map(|p| self.queue.submit(Job::OcrPage(p.id)))
            .collect();

        info!(document = %id, pages = handles.len(), "OCR dispatched");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(Stage::Ocr, id, handles.len());
        }
        Ok(handles)
    }

    pub async fn ocr_page(&self, id: PageId) -> Result<OcrOutcome, TriageError> {
        self.ocr.ocr_page(id).await
    }

    /// Label every page with text. Returns the number of pages labelled.
    pub async fn classify_document(&self, id: DocumentId) -> Result<usize, TriageError> {
        self.pages.run(id, PageOperation::Classify).await
    }

    /// Extract materials from every page with text. Returns the number of
    /// pages analysed.
    pub async fn extract_materials(&self, id: DocumentId) -> Result<usize, TriageError> {
        self.pages.run(id, PageOperation::ExtractMaterials).await
    }

    pub async fn document_stats(&self, id: DocumentId) -> Result<DocumentStats, TriageError> {
        let pages = self.store.pages(id).await?;
        Ok(DocumentStats::from_pages(&pages))
    }

    /// Execute one queued job.
    pub async fn run_job(&self, job: Job) -> Result<(), TriageError> {
        match job {
            Job::Ingest(id) => self.ingest_document(id).await.map(drop),
            Job::DispatchOcr(id) => self.dispatch_ocr(id).await.map(drop),
            Job::OcrPage(id) => self.ocr_page(id).await.map(drop),
            Job::Classify(id) => self.classify_document(id).await.map(drop),
            Job::ExtractMaterials(id) => self.extract_materials(id).await.map(drop),
        }
    }
}
