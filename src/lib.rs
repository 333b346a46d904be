//! # edgequake-doctriage
//!
//! Triage PDF documents page by page: find out which pages are scanned
//! images and which carry native text, OCR the scanned ones, then classify
//! every page and extract the materials it mentions using a language model.
//!
//! ## Why this crate?
//!
//! Technical document bundles (certificates, datasheets, specifications)
//! routinely mix born-digital pages with scans of stamped paper. Sending every
//! page to OCR is slow and expensive; trusting the embedded text layer alone
//! misses scans whose "text" is a few stray glyphs. This crate checks cheap
//! structural signals first, asks a model only when they are inconclusive,
//! and memoises the answer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Ingest    validate, extract text + layout (pdfium), scan verdict per page
//!  ├─ 2. OCR       rasterise scanned pages at 300 DPI, upload to the OCR service
//!  ├─ 3. Classify  one label per page from a closed set
//!  └─ 4. Extract   materials + characteristics as JSON
//! ```
//!
//! Each step runs as a [`Job`] on a [`JobQueue`]; results land in a
//! [`DocumentStore`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doctriage::{
//!     run_worker, Collaborators, DocumentStore, Job, JobQueue, LocalJobQueue, MemoryStore,
//!     Triage, TriageConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = TriageConfig::builder().ocr_api_key("…").build()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let (queue, jobs) = LocalJobQueue::new();
//!     let triage = Arc::new(Triage::new(
//!         store.clone(),
//!         queue.clone(),
//!         Collaborators::from_config(&config)?,
//!         config,
//!     ));
//!
//!     let worker = Arc::clone(&triage);
//!     let concurrency = triage.config().job_concurrency;
//!     tokio::spawn(run_worker(queue.clone(), jobs, concurrency, move |job| {
//!         let triage = Arc::clone(&worker);
//!         async move { triage.run_job(job).await }
//!     }));
//!
//!     let (doc, _) = triage.register_document("bundle.pdf", "bundle.pdf").await?;
//!     queue.wait_idle().await;
//!     queue.submit(Job::DispatchOcr(doc.id));
//!     queue.wait_idle().await;
//!     queue.submit(Job::Classify(doc.id));
//!     queue.wait_idle().await;
//!
//!     for page in store.pages(doc.id).await? {
//!         println!("{} scanned={} {:?}", page.number, page.is_scanned, page.classification);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doctriage` binary (clap + indicatif + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod jobs;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{TriageConfig, TriageConfigBuilder};
pub use error::{ModelError, TriageError};
pub use jobs::{run_worker, Job, JobFailure, JobHandle, JobQueue, LocalJobQueue};
pub use model::{
    BoundingBox, Document, DocumentId, DocumentStats, Material, Page, PageId, TextBlock,
};
pub use progress::{NoopProgressCallback, ProgressCallback, Stage, TriageProgressCallback};
pub use prompts::PageLabel;
pub use service::{Collaborators, Triage};
pub use store::{DocumentStore, MemoryStore};
