//! The per-document page loop shared by classification and extraction.
//!
//! Pages are visited in page-number order, one at a time. A page without
//! effective text is skipped; every other page is analysed and its result
//! saved before the next page starts. A store failure aborts the loop, and
//! pages saved before it keep their results.

use crate::error::TriageError;
use crate::model::{DocumentId, Page};
use crate::pipeline::analyze::SemanticAnalyzer;
use crate::progress::{ProgressCallback, Stage};
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Analysis applied to each page by [`PageProcessingLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOperation {
    /// Label the page and store the label.
    Classify,
    /// Extract materials and attach them to the page.
    ExtractMaterials,
}

impl PageOperation {
    pub fn stage(&self) -> Stage {
        match self {
            PageOperation::Classify => Stage::Classify,
            PageOperation::ExtractMaterials => Stage::ExtractMaterials,
        }
    }
}

pub struct PageProcessingLoop {
    store: Arc<dyn DocumentStore>,
    analyzer: Arc<SemanticAnalyzer>,
    progress: Option<ProgressCallback>,
}

impl PageProcessingLoop {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        analyzer: Arc<SemanticAnalyzer>,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            store,
            analyzer,
            progress,
        }
    }

    /// Apply `operation` to every page of `document` that has text.
    ///
    /// Returns the number of pages analysed.
    pub async fn run(
        &self,
        document: DocumentId,
        operation: PageOperation,
    ) -> Result<usize, TriageError> {
        let stage = operation.stage();
        self.store.get_document(document).await?;
        let pages = self.store.pages(document).await?;

        info!(document = %document, stage = %stage, pages = pages.len(), "Processing pages");
        if let Some(ref cb) = self.progress {
            cb.on_stage_start(stage, document, pages.len());
        }

        let mut processed = 0;
        for page in &pages {
            let text = page.effective_text();
            if text.is_empty() {
                debug!(page = page.number, stage = %stage, "No text, skipping");
                if let Some(ref cb) = self.progress {
                    cb.on_page_skipped(stage, page.number);
                }
                continue;
            }

            if let Err(e) = self.apply(operation, page, text).await {
                if let Some(ref cb) = self.progress {
                    cb.on_page_error(stage, page.number, &e.to_string());
                }
                return Err(e);
            }
            processed += 1;
            if let Some(ref cb) = self.progress {
                cb.on_page_complete(stage, page.number);
            }
        }

        if let Some(ref cb) = self.progress {
            cb.on_stage_complete(stage, document, processed);
        }
        Ok(processed)
    }

    async fn apply(
        &self,
        operation: PageOperation,
        page: &Page,
        text: &str,
    ) -> Result<(), TriageError> {
        match operation {
            PageOperation::Classify => {
                let label = self.analyzer.classify(text).await;
                debug!(page = page.number, label = %label, "Classified");
                self.store.set_classification(page.id, label).await
            }
            PageOperation::ExtractMaterials => {
                let materials = self.analyzer.extract_materials(text).await;
                debug!(page = page.number, count = materials.len(), "Extracted materials");
                self.store.add_materials(page.id, materials).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriageConfig;
    use crate::error::ModelError;
    use crate::model::NewPage;
    use crate::pipeline::llm::{ModelRequest, TextModel};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Answers with the last word of the page text and records the order.
    #[derive(Default)]
    struct LastWordModel {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextModel for LastWordModel {
        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            let word = request
                .prompt
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_string();
            self.seen.lock().unwrap().push(word.clone());
            Ok(word)
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<LastWordModel>, PageProcessingLoop, DocumentId) {
        let store = Arc::new(MemoryStore::new());
        let doc = store
            .create_document(PathBuf::from("doc.pdf"), "doc.pdf".into())
            .await
            .unwrap();
        let page = |number: u32, text: &str| NewPage {
            number,
            raw_text: text.to_string(),
            ..Default::default()
        };
        let pages = store
            .replace_pages(
                doc.id,
                vec![page(1, "first"), page(2, ""), page(3, "third")],
            )
            .await
            .unwrap();
        store
            .set_ocr_text(pages[1].id, "second".into())
            .await
            .unwrap();

        let model = Arc::new(LastWordModel::default());
        let analyzer = Arc::new(SemanticAnalyzer::new(model.clone(), TriageConfig::default()));
        let run_loop = PageProcessingLoop::new(store.clone(), analyzer, None);
        (store, model, run_loop, doc.id)
    }

    #[tokio::test]
    async fn pages_are_classified_in_order_with_effective_text() {
        let (store, model, run_loop, doc) = setup().await;

        let processed = run_loop.run(doc, PageOperation::Classify).await.unwrap();
        assert_eq!(processed, 3);
        assert_eq!(*model.seen.lock().unwrap(), ["first", "second", "third"]);

        let labels: Vec<_> = store
            .pages(doc)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.classification)
            .collect();
        assert_eq!(
            labels,
            [
                Some("first".to_string()),
                Some("second".to_string()),
                Some("third".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn pages_without_text_are_skipped() {
        let (store, model, run_loop, doc) = setup().await;
        let pages = store.pages(doc).await.unwrap();
        store.set_ocr_text(pages[1].id, String::new()).await.unwrap();

        assert_eq!(run_loop.run(doc, PageOperation::Classify).await.unwrap(), 2);
        assert_eq!(*model.seen.lock().unwrap(), ["first", "third"]);
        assert_eq!(store.get_page(pages[1].id).await.unwrap().classification, None);
    }

    #[tokio::test]
    async fn unparseable_extraction_stores_no_materials() {
        let (store, _model, run_loop, doc) = setup().await;
        let processed = run_loop
            .run(doc, PageOperation::ExtractMaterials)
            .await
            .unwrap();
        assert_eq!(processed, 3);
        for page in store.pages(doc).await.unwrap() {
            assert!(store.materials(page.id).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn missing_document_aborts() {
        let (_store, model, run_loop, _doc) = setup().await;
        let err = run_loop
            .run(DocumentId(42), PageOperation::Classify)
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::DocumentNotFound(DocumentId(42))));
        assert!(model.seen.lock().unwrap().is_empty());
    }
}
