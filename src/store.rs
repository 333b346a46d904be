//! Persistence contract consumed by the pipeline.
//!
//! The pipeline never talks to a database directly: it reads and writes
//! through [`DocumentStore`]. [`MemoryStore`] is the bundled implementation,
//! used by the CLI and the tests; a service embedding this crate plugs in
//! its own.

use crate::error::TriageError;
use crate::model::{
    Document, DocumentId, Material, NewMaterial, NewPage, Page, PageId, TextBlock,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Create/read/update access to documents, pages, blocks and materials.
///
/// Lookups of unknown identifiers fail with [`TriageError::DocumentNotFound`]
/// or [`TriageError::PageNotFound`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(
        &self,
        source: PathBuf,
        original_filename: String,
    ) -> Result<Document, TriageError>;

    async fn get_document(&self, id: DocumentId) -> Result<Document, TriageError>;

    async fn get_page(&self, id: PageId) -> Result<Page, TriageError>;

    /// Pages of a document ordered by page number ascending.
    async fn pages(&self, document: DocumentId) -> Result<Vec<Page>, TriageError>;

    async fn blocks(&self, page: PageId) -> Result<Vec<TextBlock>, TriageError>;

    async fn materials(&self, page: PageId) -> Result<Vec<Material>, TriageError>;

    /// Replace every page of `document` in one step.
    ///
    /// Either all pages (with their blocks) are stored or none are. Page
    /// numbers must be exactly `1..=pages.len()` in order.
    async fn replace_pages(
        &self,
        document: DocumentId,
        pages: Vec<NewPage>,
    ) -> Result<Vec<Page>, TriageError>;

    async fn set_ocr_text(&self, page: PageId, text: String) -> Result<(), TriageError>;

    async fn set_classification(&self, page: PageId, label: String) -> Result<(), TriageError>;

    async fn add_materials(
        &self,
        page: PageId,
        materials: Vec<NewMaterial>,
    ) -> Result<(), TriageError>;
}

/// Check that `pages` are numbered `1..=N` in order.
pub fn validate_numbering(pages: &[NewPage]) -> Result<(), TriageError> {
    for (idx, page) in pages.iter().enumerate() {
        let expected = idx as u32 + 1;
        if page.number != expected {
            return Err(TriageError::Store(format!(
                "page numbers must be contiguous from 1: expected {expected}, got {}",
                page.number
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Tables {
    next_document: u64,
    next_page: u64,
    documents: HashMap<DocumentId, Document>,
    pages: HashMap<PageId, Page>,
    blocks: HashMap<PageId, Vec<TextBlock>>,
    materials: HashMap<PageId, Vec<Material>>,
}

impl Tables {
    fn page_mut(&mut self, id: PageId) -> Result<&mut Page, TriageError> {
        self.pages.get_mut(&id).ok_or(TriageError::PageNotFound(id))
    }
}

/// In-process [`DocumentStore`] backed by hash maps behind one `RwLock`.
///
/// A single lock over all tables keeps bulk writes atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, TriageError> {
        self.tables
            .read()
            .map_err(|_| TriageError::Store("store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, TriageError> {
        self.tables
            .write()
            .map_err(|_| TriageError::Store("store lock poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        source: PathBuf,
        original_filename: String,
    ) -> Result<Document, TriageError> {
        let mut t = self.write()?;
        t.next_document += 1;
        let doc = Document {
            id: DocumentId(t.next_document),
            source,
            original_filename,
        };
        t.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Document, TriageError> {
        self.read()?
            .documents
            .get(&id)
            .cloned()
            .ok_or(TriageError::DocumentNotFound(id))
    }

    async fn get_page(&self, id: PageId) -> Result<Page, TriageError> {
        self.read()?
            .pages
            .get(&id)
            .cloned()
            .ok_or(TriageError::PageNotFound(id))
    }

    async fn pages(&self, document: DocumentId) -> Result<Vec<Page>, TriageError> {
        let t = self.read()?;
        if !t.documents.contains_key(&document) {
            return Err(TriageError::DocumentNotFound(document));
        }
        let mut pages: Vec<Page> = t
            .pages
            .values()
            .filter(|p| p.document_id == document)
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.number);
        Ok(pages)
    }

    async fn blocks(&self, page: PageId) -> Result<Vec<TextBlock>, TriageError> {
        let t = self.read()?;
        if !t.pages.contains_key(&page) {
            return Err(TriageError::PageNotFound(page));
        }
        Ok(t.blocks.get(&page).cloned().unwrap_or_default())
    }

    async fn materials(&self, page: PageId) -> Result<Vec<Material>, TriageError> {
        let t = self.read()?;
        if !t.pages.contains_key(&page) {
            return Err(TriageError::PageNotFound(page));
        }
        Ok(t.materials.get(&page).cloned().unwrap_or_default())
    }

    async fn replace_pages(
        &self,
        document: DocumentId,
        pages: Vec<NewPage>,
    ) -> Result<Vec<Page>, TriageError> {
        validate_numbering(&pages)?;

        let mut t = self.write()?;
        if !t.documents.contains_key(&document) {
            return Err(TriageError::DocumentNotFound(document));
        }

        // Drop the previous ingestion together with everything hanging off it.
        let stale: Vec<PageId> = t
            .pages
            .values()
            .filter(|p| p.document_id == document)
            .map(|p| p.id)
            .collect();
        for id in stale {
            t.pages.remove(&id);
            t.blocks.remove(&id);
            t.materials.remove(&id);
        }

        let mut created = Vec::with_capacity(pages.len());
        for new_page in pages {
            t.next_page += 1;
            let id = PageId(t.next_page);
            let page = Page {
                id,
                document_id: document,
                number: new_page.number,
                is_scanned: new_page.is_scanned,
                raw_text: new_page.raw_text,
                ocr_text: String::new(),
                classification: None,
                width: new_page.width,
                height: new_page.height,
            };
            let blocks: Vec<TextBlock> = new_page
                .blocks
                .into_iter()
                .filter(|b| !b.text.trim().is_empty())
                .map(|b| TextBlock {
                    page_id: id,
                    bbox: b.bbox,
                    text: b.text,
                })
                .collect();
            t.blocks.insert(id, blocks);
            t.pages.insert(id, page.clone());
            created.push(page);
        }
        Ok(created)
    }

    async fn set_ocr_text(&self, page: PageId, text: String) -> Result<(), TriageError> {
        self.write()?.page_mut(page)?.ocr_text = text;
        Ok(())
    }

    async fn set_classification(&self, page: PageId, label: String) -> Result<(), TriageError> {
        self.write()?.page_mut(page)?.classification = Some(label);
        Ok(())
    }

    async fn add_materials(
        &self,
        page: PageId,
        materials: Vec<NewMaterial>,
    ) -> Result<(), TriageError> {
        let mut t = self.write()?;
        t.page_mut(page)?;
        t.materials
            .entry(page)
            .or_default()
            .extend(materials.into_iter().map(|m| Material {
                page_id: page,
                name: m.name,
                characteristics: m.characteristics,
            }));
        Ok(())
    }
}
