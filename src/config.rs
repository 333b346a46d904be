//! Configuration for the triage pipeline.
//!
//! All pipeline behaviour is controlled through [`TriageConfig`], built via
//! its [`TriageConfigBuilder`]. Thresholds, prompt windows and timeouts live
//! here rather than as scattered constants so two runs can be compared by
//! diffing their configs.

use crate::error::TriageError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default OCR endpoint (Mistral OCR).
pub const DEFAULT_OCR_URL: &str = "https://api.mistral.com/v1/ocr";

/// Configuration for ingestion, scan detection, OCR and page analysis.
///
/// # Example
/// ```rust
/// use edgequake_doctriage::TriageConfig;
///
/// let config = TriageConfig::builder()
///     .dpi(200)
///     .ocr_api_key("secret")
///     .job_concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct TriageConfig {
    /// Rasterisation DPI for pages sent to OCR. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Share of the page covered by images above which a text-poor page is
    /// a scan. Default: 0.70.
    pub image_coverage_threshold: f32,

    /// Pages with fewer trimmed characters than this count as text-poor for
    /// the image-coverage rule. Default: 10.
    pub sparse_text_chars: usize,

    /// Characters of page text sent with the scan-verdict prompt. Default: 2000.
    pub scan_prompt_chars: usize,

    /// Characters of page text sent with the classification prompt. Default: 2000.
    pub classify_prompt_chars: usize,

    /// Characters of page text sent with the extraction prompt. Default: 4000.
    pub extract_prompt_chars: usize,

    /// Budget for one scan-verdict model call. Default: 5 s.
    pub scan_timeout_secs: u64,

    /// Budget for one classification call. Default: 30 s.
    pub classify_timeout_secs: u64,

    /// Budget for one extraction call. Default: 30 s.
    pub extract_timeout_secs: u64,

    /// Budget for one OCR upload. Default: 30 s.
    pub ocr_timeout_secs: u64,

    /// How long a scan verdict stays cached. Default: 3600 s.
    pub verdict_cache_ttl_secs: u64,

    pub scan_max_tokens: usize,
    pub classify_max_tokens: usize,
    pub extract_max_tokens: usize,

    /// Sampling temperature for every model call. Default: 0.2.
    pub temperature: f32,

    /// OCR endpoint receiving the page PNG as a multipart upload.
    pub ocr_url: String,

    /// Bearer token for the OCR endpoint.
    pub ocr_api_key: Option<String>,

    /// Completion-style endpoint (`{"prompt","max_tokens"}` → `choices[0].text`).
    /// When set it is used instead of an edgequake-llm provider.
    pub completion_url: Option<String>,

    /// Bearer token for [`Self::completion_url`].
    pub completion_token: Option<String>,

    /// LLM model identifier for provider-based deployments.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Jobs executed at once by [`crate::jobs::run_worker`]. Default: 4.
    pub job_concurrency: usize,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            image_coverage_threshold: 0.70,
            sparse_text_chars: 10,
            scan_prompt_chars: 2000,
            classify_prompt_chars: 2000,
            extract_prompt_chars: 4000,
            scan_timeout_secs: 5,
            classify_timeout_secs: 30,
            extract_timeout_secs: 30,
            ocr_timeout_secs: 30,
            verdict_cache_ttl_secs: 3600,
            scan_max_tokens: 5,
            classify_max_tokens: 10,
            extract_max_tokens: 2048,
            temperature: 0.2,
            ocr_url: DEFAULT_OCR_URL.to_string(),
            ocr_api_key: None,
            completion_url: None,
            completion_token: None,
            model: None,
            provider_name: None,
            provider: None,
            password: None,
            job_concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TriageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageConfig")
            .field("dpi", &self.dpi)
            .field("image_coverage_threshold", &self.image_coverage_threshold)
            .field("sparse_text_chars", &self.sparse_text_chars)
            .field("scan_prompt_chars", &self.scan_prompt_chars)
            .field("classify_prompt_chars", &self.classify_prompt_chars)
            .field("extract_prompt_chars", &self.extract_prompt_chars)
            .field("scan_timeout_secs", &self.scan_timeout_secs)
            .field("classify_timeout_secs", &self.classify_timeout_secs)
            .field("extract_timeout_secs", &self.extract_timeout_secs)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("verdict_cache_ttl_secs", &self.verdict_cache_ttl_secs)
            .field("temperature", &self.temperature)
            .field("ocr_url", &self.ocr_url)
            .field("ocr_api_key", &self.ocr_api_key.as_ref().map(|_| "<redacted>"))
            .field("completion_url", &self.completion_url)
            .field(
                "completion_token",
                &self.completion_token.as_ref().map(|_| "<redacted>"),
            )
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("job_concurrency", &self.job_concurrency)
            .finish()
    }
}

impl TriageConfig {
    /// Create a new builder for `TriageConfig`.
    pub fn builder() -> TriageConfigBuilder {
        TriageConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn verdict_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.verdict_cache_ttl_secs)
    }
}

/// Builder for [`TriageConfig`].
pub struct TriageConfigBuilder {
    config: TriageConfig,
}

impl fmt::Debug for TriageConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl TriageConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn image_coverage_threshold(mut self, ratio: f32) -> Self {
        self.config.image_coverage_threshold = ratio;
        self
    }

    pub fn sparse_text_chars(mut self, n: usize) -> Self {
        self.config.sparse_text_chars = n;
        self
    }

    pub fn scan_prompt_chars(mut self, n: usize) -> Self {
        self.config.scan_prompt_chars = n;
        self
    }

    pub fn classify_prompt_chars(mut self, n: usize) -> Self {
        self.config.classify_prompt_chars = n;
        self
    }

    pub fn extract_prompt_chars(mut self, n: usize) -> Self {
        self.config.extract_prompt_chars = n;
        self
    }

    pub fn scan_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scan_timeout_secs = secs;
        self
    }

    pub fn classify_timeout_secs(mut self, secs: u64) -> Self {
        self.config.classify_timeout_secs = secs;
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn verdict_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.verdict_cache_ttl_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn ocr_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_url = url.into();
        self
    }

    pub fn ocr_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.ocr_api_key = Some(key.into());
        self
    }

    pub fn completion_url(mut self, url: impl Into<String>) -> Self {
        self.config.completion_url = Some(url.into());
        self
    }

    pub fn completion_token(mut self, token: impl Into<String>) -> Self {
        self.config.completion_token = Some(token.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn job_concurrency(mut self, n: usize) -> Self {
        self.config.job_concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TriageConfig, TriageError> {
        let c = &self.config;
        if !(c.image_coverage_threshold > 0.0 && c.image_coverage_threshold <= 1.0) {
            return Err(TriageError::InvalidConfig(format!(
                "image coverage threshold must be in (0, 1], got {}",
                c.image_coverage_threshold
            )));
        }
        if c.scan_prompt_chars == 0 || c.classify_prompt_chars == 0 || c.extract_prompt_chars == 0
        {
            return Err(TriageError::InvalidConfig(
                "prompt windows must be at least 1 character".into(),
            ));
        }
        if c.scan_timeout_secs == 0
            || c.classify_timeout_secs == 0
            || c.extract_timeout_secs == 0
            || c.ocr_timeout_secs == 0
        {
            return Err(TriageError::InvalidConfig("timeouts must be ≥ 1s".into()));
        }
        if c.ocr_url.trim().is_empty() {
            return Err(TriageError::InvalidConfig("OCR URL must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let c = TriageConfig::default();
        assert_eq!(c.dpi, 300);
        assert_eq!(c.image_coverage_threshold, 0.70);
        assert_eq!(c.scan_prompt_chars, 2000);
        assert_eq!(c.extract_prompt_chars, 4000);
        assert_eq!(c.scan_timeout(), Duration::from_secs(5));
        assert_eq!(c.verdict_cache_ttl(), Duration::from_secs(3600));
        assert_eq!(c.ocr_url, DEFAULT_OCR_URL);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = TriageConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(c.dpi, 600);
    }

    #[test]
    fn job_concurrency_defaults_to_four_and_never_drops_to_zero() {
        assert_eq!(TriageConfig::default().job_concurrency, 4);
        let c = TriageConfig::builder().job_concurrency(0).build().unwrap();
        assert_eq!(c.job_concurrency, 1);
    }

    #[test]
    fn builder_rejects_bad_threshold() {
        let err = TriageConfig::builder()
            .image_coverage_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, TriageError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = TriageConfig::builder()
            .ocr_api_key("sk-very-secret")
            .completion_token("tok-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(!dbg.contains("tok-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
