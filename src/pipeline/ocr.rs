//! OCR for scanned pages: rasterise, upload, store the recognised text.
//!
//! Recognition is delegated to an external HTTP service. Each page is an
//! independent unit of work; a failed upload fails only that page's job and
//! is surfaced to the job queue, never swallowed.

use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::model::PageId;
use crate::pipeline::render::PageRasterizer;
use crate::progress::Stage;
use crate::store::DocumentStore;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Recognises the text in a page image.
#[async_trait]
pub trait OcrService: Send + Sync {
    async fn recognize(&self, page: PageId, image: &Path) -> Result<String, TriageError>;
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

/// [`OcrService`] that uploads the image as multipart field `file` with a
/// bearer token and reads `text` from the JSON answer.
pub struct HttpOcrService {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpOcrService {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TriageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TriageError::Internal(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
            timeout,
        })
    }

    pub fn from_config(config: &TriageConfig) -> Result<Self, TriageError> {
        Self::new(
            config.ocr_url.clone(),
            config.ocr_api_key.clone(),
            config.ocr_timeout(),
        )
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn recognize(&self, page: PageId, image: &Path) -> Result<String, TriageError> {
        let transport = |detail: String| TriageError::OcrTransport { page, detail };

        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| transport(format!("cannot read {}: {}", image.display(), e)))?;

        let part = Part::bytes(bytes)
            .file_name("page.png")
            .mime_str("image/png")
            .map_err(|e| transport(e.to_string()))?;
        let form = Form::new().part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                transport(format!("timed out after {:?}", self.timeout))
            } else {
                transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TriageError::OcrFailed {
                page,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OcrResponse = resp
            .json()
            .await
            .map_err(|e| transport(format!("invalid OCR response: {}", e)))?;
        Ok(parsed.text)
    }
}

/// Outcome of one OCR unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrOutcome {
    /// Text was recognised and stored.
    Recognized,
    /// The page is native text, or already carries OCR text.
    Skipped,
}

/// Drives OCR for single pages against the store.
pub struct OcrDispatcher {
    store: Arc<dyn DocumentStore>,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrService>,
    config: TriageConfig,
}

impl OcrDispatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrService>,
        config: TriageConfig,
    ) -> Self {
        Self {
            store,
            rasterizer,
            ocr,
            config,
        }
    }

    /// OCR one page if it is scanned and has no OCR text yet.
    pub async fn ocr_page(&self, page_id: PageId) -> Result<OcrOutcome, TriageError> {
        let page = self.store.get_page(page_id).await?;
        if !page.needs_ocr() {
            debug!(page = %page_id, "OCR not needed");
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_page_skipped(Stage::Ocr, page.number);
            }
            return Ok(OcrOutcome::Skipped);
        }

        let document = self.store.get_document(page.document_id).await?;

        let result = self.recognize(&document.source, page_id, page.number).await;
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_error(Stage::Ocr, page.number, &e.to_string());
                }
                return Err(e);
            }
        };

        info!(
            document = %document.id,
            page = page.number,
            chars = text.chars().count(),
            "OCR text stored"
        );
        self.store.set_ocr_text(page_id, text).await?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_complete(Stage::Ocr, page.number);
        }
        Ok(OcrOutcome::Recognized)
    }

    async fn recognize(
        &self,
        source: &Path,
        page_id: PageId,
        page_number: u32,
    ) -> Result<String, TriageError> {
        // The temp file lives until the upload finishes.
        let image = self
            .rasterizer
            .rasterize(source, page_number, self.config.dpi)
            .await?;
        self.ocr.recognize(page_id, image.path()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewPage;
    use crate::store::MemoryStore;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct RecordingRasterizer {
        calls: Mutex<Vec<(PathBuf, u32, u32)>>,
    }

    #[async_trait]
    impl PageRasterizer for RecordingRasterizer {
        async fn rasterize(
            &self,
            source: &Path,
            page_number: u32,
            dpi: u32,
        ) -> Result<NamedTempFile, TriageError> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_path_buf(), page_number, dpi));
            let mut f = NamedTempFile::new().map_err(|e| TriageError::Internal(e.to_string()))?;
            write!(f, "page {page_number}").map_err(|e| TriageError::Internal(e.to_string()))?;
            Ok(f)
        }
    }

    struct EchoOcr;

    #[async_trait]
    impl OcrService for EchoOcr {
        async fn recognize(&self, _page: PageId, image: &Path) -> Result<String, TriageError> {
            let content = tokio::fs::read_to_string(image)
                .await
                .map_err(|e| TriageError::Internal(e.to_string()))?;
            Ok(format!("recognised {content}"))
        }
    }

    struct RejectingOcr;

    #[async_trait]
    impl OcrService for RejectingOcr {
        async fn recognize(&self, page: PageId, _image: &Path) -> Result<String, TriageError> {
            Err(TriageError::OcrFailed {
                page,
                status: 401,
                body: "unauthorized".into(),
            })
        }
    }

    async fn seeded_store() -> (Arc<MemoryStore>, Vec<PageId>) {
        let store = Arc::new(MemoryStore::new());
        let doc = store
            .create_document(PathBuf::from("/data/doc.pdf"), "doc.pdf".into())
            .await
            .unwrap();
        let pages = store
            .replace_pages(
                doc.id,
                vec![
                    NewPage {
                        number: 1,
                        is_scanned: false,
                        raw_text: "native".into(),
                        ..Default::default()
                    },
                    NewPage {
                        number: 2,
                        is_scanned: true,
                        ..Default::default()
                    },
                ],
            )
            .await
            .unwrap();
        (store, pages.iter().map(|p| p.id).collect())
    }

    #[tokio::test]
    async fn scanned_page_is_rendered_at_configured_dpi_and_stored() {
        let (store, ids) = seeded_store().await;
        let rasterizer = Arc::new(RecordingRasterizer::default());
        let dispatcher = OcrDispatcher::new(
            store.clone(),
            rasterizer.clone(),
            Arc::new(EchoOcr),
            TriageConfig::default(),
        );

        let outcome = dispatcher.ocr_page(ids[1]).await.unwrap();
        assert_eq!(outcome, OcrOutcome::Recognized);
        assert_eq!(store.get_page(ids[1]).await.unwrap().ocr_text, "recognised page 2");
        assert_eq!(
            rasterizer.calls.lock().unwrap().as_slice(),
            &[(PathBuf::from("/data/doc.pdf"), 2, 300)]
        );

        // Re-dispatch is a no-op.
        assert_eq!(dispatcher.ocr_page(ids[1]).await.unwrap(), OcrOutcome::Skipped);
        assert_eq!(rasterizer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn native_pages_are_skipped() {
        let (store, ids) = seeded_store().await;
        let dispatcher = OcrDispatcher::new(
            store,
            Arc::new(RecordingRasterizer::default()),
            Arc::new(EchoOcr),
            TriageConfig::default(),
        );
        assert_eq!(dispatcher.ocr_page(ids[0]).await.unwrap(), OcrOutcome::Skipped);
    }

    #[tokio::test]
    async fn service_failures_surface_with_status() {
        let (store, ids) = seeded_store().await;
        let dispatcher = OcrDispatcher::new(
            store.clone(),
            Arc::new(RecordingRasterizer::default()),
            Arc::new(RejectingOcr),
            TriageConfig::default(),
        );

        let err = dispatcher.ocr_page(ids[1]).await.unwrap_err();
        assert!(matches!(err, TriageError::OcrFailed { status: 401, .. }));
        assert!(store.get_page(ids[1]).await.unwrap().ocr_text.is_empty());
    }

    #[tokio::test]
    async fn unknown_page_is_a_lookup_error() {
        let (store, _) = seeded_store().await;
        let dispatcher = OcrDispatcher::new(
            store,
            Arc::new(RecordingRasterizer::default()),
            Arc::new(EchoOcr),
            TriageConfig::default(),
        );
        let err = dispatcher.ocr_page(PageId(999)).await.unwrap_err();
        assert!(matches!(err, TriageError::PageNotFound(PageId(999))));
    }

    // ── HTTP wire format ─────────────────────────────────────────────────

    use crate::pipeline::http_stub::{closed_port_url, serve_once};

    fn page_image() -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"\x89PNG fake image bytes").unwrap();
        f
    }

    fn service(url: String, key: Option<&str>) -> HttpOcrService {
        HttpOcrService::new(
            format!("{url}/v1/ocr"),
            key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upload_is_multipart_file_with_bearer_token() {
        let (url, server) =
            serve_once(200, "application/json", r#"{"text": "Сталь 12Х18Н10Т"}"#).await;
        let image = page_image();

        let text = service(url, Some("sk-ocr"))
            .recognize(PageId(3), image.path())
            .await
            .unwrap();
        assert_eq!(text, "Сталь 12Х18Н10Т");

        let request = server.await.unwrap();
        assert!(request.request_line().starts_with("post /v1/ocr "));
        assert_eq!(request.header("authorization"), Some("bearer sk-ocr"));
        assert!(request
            .header("content-type")
            .is_some_and(|ct| ct.starts_with("multipart/form-data; boundary=")));
        assert!(request.body.contains(r#"name="file"; filename="page.png""#));
        assert!(request.body.to_lowercase().contains("content-type: image/png"));
        assert!(request.body.contains("PNG fake image bytes"));
    }

    #[tokio::test]
    async fn no_api_key_means_no_authorization_header() {
        let (url, server) = serve_once(200, "application/json", r#"{"text": "x"}"#).await;
        let image = page_image();
        service(url, None).recognize(PageId(1), image.path()).await.unwrap();
        assert_eq!(server.await.unwrap().header("authorization"), None);
    }

    #[tokio::test]
    async fn non_success_status_carries_the_raw_body() {
        let (url, server) = serve_once(401, "text/plain", "invalid api key").await;
        let image = page_image();

        let err = service(url, Some("wrong"))
            .recognize(PageId(3), image.path())
            .await
            .unwrap_err();
        match err {
            TriageError::OcrFailed { page, status, body } => {
                assert_eq!(page, PageId(3));
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected OcrFailed, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_text_field_is_empty_text() {
        let (url, server) = serve_once(200, "application/json", r#"{"pages": []}"#).await;
        let image = page_image();
        let text = service(url, None).recognize(PageId(1), image.path()).await.unwrap();
        assert_eq!(text, "");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_json_answer_is_a_transport_error() {
        let (url, server) = serve_once(200, "text/html", "<html>maintenance</html>").await;
        let image = page_image();
        let err = service(url, None)
            .recognize(PageId(2), image.path())
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::OcrTransport { page: PageId(2), .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let image = page_image();
        let err = service(closed_port_url().await, None)
            .recognize(PageId(4), image.path())
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::OcrTransport { page: PageId(4), .. }));
    }
}
