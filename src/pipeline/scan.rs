//! Scanned-vs-native detection for a single page.
//!
//! The decision is an ordered chain of pure rules over a [`PageSignals`]
//! record. Each rule answers [`Verdict::Scanned`], [`Verdict::Native`] or
//! [`Verdict::Inconclusive`]; the first definite answer wins. When every rule
//! is inconclusive the page text goes to a language model, whose verdict is
//! memoised in a [`VerdictCache`]. If the model call fails the detector falls
//! back to [`default_heuristic`], so detection always yields a boolean.
//!
//! ```text
//! empty_page ─▶ image_coverage ─▶ ocr_artifacts ─▶ cache ─▶ model ─▶ default_heuristic
//! ```

use crate::config::TriageConfig;
use crate::model::BoundingBox;
use crate::pipeline::cache::{cache_key, VerdictCache};
use crate::pipeline::extract::{BlockKind, PageLayout};
use crate::pipeline::llm::{ModelRequest, TextModel};
use crate::prompts::{scan_verdict_prompt, SYSTEM_PROMPT};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Character sequences OCR engines typically emit for misread glyphs.
const CONFUSION_PAIRS: [&str; 11] = [
    "vv", "nn", "rr", "qq", "1i", "l1", "0o", "o0", ",,", "..", ";;",
];

/// Characters that rarely appear in native text but are common OCR noise.
const ARTIFACT_CHARS: [char; 5] = ['|', '\\', '/', '[', ']'];

/// Letter-spaced runs ("a b c") that OCR produces when it splits a word.
///
/// `\w` is Unicode-aware, so prose with adjacent one-letter words
/// ("по ГОСТ и в соответствии") matches too. Such pages are reported as
/// scanned and go to OCR.
static SPACED_LETTERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w(?: \w)+\b").unwrap());

/// Outcome of one detection rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Scanned,
    Native,
    Inconclusive,
}

/// Everything the detection rules look at, computed once per page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSignals {
    /// Trimmed embedded text.
    pub text: String,
    pub page_area: f32,
    /// Summed area of image blocks.
    pub image_area: f32,
    /// Summed area of text blocks.
    pub text_block_area: f32,
}

impl PageSignals {
    pub fn from_layout(layout: &PageLayout) -> Self {
        let sum = |kind: BlockKind| -> f32 {
            layout
                .blocks
                .iter()
                .filter(|b| b.kind == kind)
                .map(|b| b.bbox.area())
                .sum()
        };
        Self {
            text: layout.raw_text.trim().to_string(),
            page_area: BoundingBox::new(0.0, 0.0, layout.width, layout.height).area(),
            image_area: sum(BlockKind::Image),
            text_block_area: sum(BlockKind::Text),
        }
    }

    /// Share of the page covered by images, or `None` for a zero-area page.
    pub fn image_coverage(&self) -> Option<f32> {
        (self.page_area > 0.0).then(|| self.image_area / self.page_area)
    }
}

/// Tunables consulted by the rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanThresholds {
    pub image_coverage: f32,
    pub sparse_text_chars: usize,
}

impl From<&TriageConfig> for ScanThresholds {
    fn from(config: &TriageConfig) -> Self {
        Self {
            image_coverage: config.image_coverage_threshold,
            sparse_text_chars: config.sparse_text_chars,
        }
    }
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self::from(&TriageConfig::default())
    }
}

type Rule = fn(&PageSignals, &ScanThresholds) -> Verdict;

/// Local rules, cheapest first.
const RULES: &[(&str, Rule)] = &[
    ("empty_page", empty_page),
    ("image_coverage", image_coverage),
    ("ocr_artifacts", ocr_artifacts),
];

fn empty_page(signals: &PageSignals, _: &ScanThresholds) -> Verdict {
    if signals.text.trim().is_empty() {
        Verdict::Scanned
    } else {
        Verdict::Inconclusive
    }
}

fn image_coverage(signals: &PageSignals, thresholds: &ScanThresholds) -> Verdict {
    let sparse = signals.text.trim().chars().count() < thresholds.sparse_text_chars;
    match signals.image_coverage() {
        Some(ratio) if sparse && ratio > thresholds.image_coverage => Verdict::Scanned,
        _ => Verdict::Inconclusive,
    }
}

fn ocr_artifacts(signals: &PageSignals, _: &ScanThresholds) -> Verdict {
    if looks_like_ocr_artifacts(&signals.text) {
        Verdict::Scanned
    } else {
        Verdict::Inconclusive
    }
}

/// Run the local rules in order. Returns the deciding rule's name and its
/// verdict, or `None` when every rule is inconclusive.
pub fn local_verdict(
    signals: &PageSignals,
    thresholds: &ScanThresholds,
) -> Option<(&'static str, Verdict)> {
    RULES.iter().find_map(|(name, rule)| match rule(signals, thresholds) {
        Verdict::Inconclusive => None,
        verdict => Some((*name, verdict)),
    })
}

/// True when `text` carries the usual marks of character recognition:
/// letter-spaced words, stray bracket/bar characters, a digit-heavy mix, or
/// frequent glyph-confusion pairs.
pub fn looks_like_ocr_artifacts(text: &str) -> bool {
    let spaced_word = SPACED_LETTERS.find_iter(text).any(|m| {
        let collapsed = m.as_str().chars().filter(|c| !c.is_whitespace()).count();
        collapsed < 10
    });
    if spaced_word {
        return true;
    }

    if text.contains(ARTIFACT_CHARS) {
        return true;
    }

    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    if digits > 0 && letters > 0 && digits as f64 / letters as f64 > 0.5 {
        return true;
    }

    let word_count = text.split_whitespace().count();
    let confusions: usize = CONFUSION_PAIRS.iter().map(|p| text.matches(p).count()).sum();
    confusions as f64 > word_count as f64 / 10.0
}

/// Last-resort verdict when the model cannot be reached.
pub fn default_heuristic(signals: &PageSignals) -> bool {
    let words: Vec<&str> = signals.text.split_whitespace().collect();
    if !words.is_empty() && words.len() < 10 {
        let chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg = chars as f64 / words.len() as f64;
        if !(2.0..=15.0).contains(&avg) {
            return true;
        }
    }
    signals.page_area > 0.0 && signals.text_block_area / signals.page_area < 0.05
}

/// Three-tier scan detector with a memoised model fallback.
pub struct ScanDetector {
    model: Arc<dyn TextModel>,
    cache: Arc<dyn VerdictCache>,
    config: TriageConfig,
}

impl ScanDetector {
    pub fn new(model: Arc<dyn TextModel>, cache: Arc<dyn VerdictCache>, config: TriageConfig) -> Self {
        Self {
            model,
            cache,
            config,
        }
    }

    /// Scanned verdict for one extracted page.
    pub async fn is_scanned(&self, layout: &PageLayout) -> bool {
        let signals = PageSignals::from_layout(layout);
        let scanned = self.detect(&signals).await;
        debug!(page = layout.number(), scanned, "Scan verdict");
        scanned
    }

    pub async fn detect(&self, signals: &PageSignals) -> bool {
        let thresholds = ScanThresholds::from(&self.config);
        if let Some((rule, verdict)) = local_verdict(signals, &thresholds) {
            debug!(rule, ?verdict, "Decided by local rule");
            return verdict == Verdict::Scanned;
        }
        self.model_verdict(signals).await
    }

    async fn model_verdict(&self, signals: &PageSignals) -> bool {
        let key = cache_key(&signals.text);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Scan verdict cache hit");
            return cached;
        }

        let request = ModelRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: scan_verdict_prompt(&signals.text, self.config.scan_prompt_chars),
            max_tokens: self.config.scan_max_tokens,
            temperature: self.config.temperature,
        };

        let timeout = self.config.scan_timeout();
        match tokio::time::timeout(timeout, self.model.complete(&request)).await {
            Ok(Ok(answer)) => {
                let scanned = answer.to_lowercase().contains("scan");
                self.cache
                    .set(&key, scanned, self.config.verdict_cache_ttl());
                scanned
            }
            Ok(Err(e)) => {
                warn!("Scan verdict model call failed, using heuristic: {}", e);
                default_heuristic(signals)
            }
            Err(_) => {
                warn!(
                    "Scan verdict model call timed out after {:?}, using heuristic",
                    timeout
                );
                default_heuristic(signals)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::pipeline::cache::MemoryVerdictCache;
    use crate::pipeline::extract::StructuralBlock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingModel {
        answer: Result<String, ModelError>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(ModelError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextModel for CountingModel {
        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn detector(model: Arc<CountingModel>) -> ScanDetector {
        ScanDetector::new(
            model,
            Arc::new(MemoryVerdictCache::new()),
            TriageConfig::default(),
        )
    }

    fn layout(text: &str, blocks: Vec<StructuralBlock>) -> PageLayout {
        PageLayout {
            index: 0,
            raw_text: text.to_string(),
            width: 100.0,
            height: 100.0,
            blocks,
        }
    }

    fn image(fraction: f32) -> StructuralBlock {
        StructuralBlock::image(BoundingBox::new(0.0, 0.0, 100.0, 100.0 * fraction))
    }

    const CLEAN: &str = "The supplier confirms that the delivered steel complies with the order.";

    #[test]
    fn artifact_examples() {
        assert!(looks_like_ocr_artifacts("a b cde fgh"));
        assert!(!looks_like_ocr_artifacts("This is clean text."));
    }

    #[test]
    fn artifact_rules_fire_individually() {
        assert!(looks_like_ocr_artifacts("total | 42"));
        assert!(looks_like_ocr_artifacts("item [3]"));
        assert!(looks_like_ocr_artifacts("12345 ab"));
        assert!(looks_like_ocr_artifacts("vvord rnodern"));
        assert!(!looks_like_ocr_artifacts("Order 12 received"));
    }

    #[test]
    fn adjacent_one_letter_words_read_as_letter_spacing() {
        assert!(looks_like_ocr_artifacts(
            "Сталь поставляется по ГОСТ и в соответствии с договором"
        ));
        assert!(!looks_like_ocr_artifacts(
            "Сталь поставляется по ГОСТ в соответствии с договором"
        ));
    }

    #[test]
    fn long_spaced_runs_are_not_artifacts() {
        // Ten letter-spaced glyphs collapse to a 10-character word.
        assert!(!looks_like_ocr_artifacts("S P E C I F I C A T"));
    }

    #[test]
    fn empty_text_is_scanned() {
        let signals = PageSignals::from_layout(&layout("   ", vec![]));
        assert_eq!(
            local_verdict(&signals, &ScanThresholds::default()),
            Some(("empty_page", Verdict::Scanned))
        );
    }

    #[test]
    fn image_coverage_needs_sparse_text() {
        let th = ScanThresholds::default();

        let sparse = PageSignals::from_layout(&layout("p. 4", vec![image(0.8)]));
        assert_eq!(
            local_verdict(&sparse, &th),
            Some(("image_coverage", Verdict::Scanned))
        );

        let rich = PageSignals::from_layout(&layout(CLEAN, vec![image(0.8)]));
        assert_eq!(local_verdict(&rich, &th), None);
    }

    #[test]
    fn zero_area_pages_skip_the_coverage_rule() {
        let mut l = layout("p. 4", vec![image(0.8)]);
        l.width = 0.0;
        let signals = PageSignals::from_layout(&l);
        assert_eq!(signals.image_coverage(), None);
        assert_eq!(image_coverage(&signals, &ScanThresholds::default()), Verdict::Inconclusive);
    }

    #[test]
    fn default_heuristic_looks_at_word_shape_and_text_area() {
        let mut s = PageSignals {
            text: "x y z".into(),
            page_area: 100.0,
            image_area: 0.0,
            text_block_area: 50.0,
        };
        assert!(default_heuristic(&s));

        s.text = CLEAN.into();
        assert!(!default_heuristic(&s));

        s.text_block_area = 1.0;
        assert!(default_heuristic(&s));
    }

    #[tokio::test]
    async fn model_verdicts_are_memoised() {
        let model = CountingModel::answering("Scan");
        let d = detector(model.clone());
        let page = layout(CLEAN, vec![StructuralBlock::text(
            BoundingBox::new(0.0, 0.0, 100.0, 50.0),
            CLEAN,
        )]);

        assert!(d.is_scanned(&page).await);
        assert!(d.is_scanned(&page).await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn text_answer_means_native() {
        let model = CountingModel::answering("text");
        let d = detector(model.clone());
        assert!(!d.is_scanned(&layout(CLEAN, vec![])).await);
    }

    #[tokio::test]
    async fn local_rules_skip_the_model() {
        let model = CountingModel::answering("text");
        let d = detector(model.clone());
        assert!(d.is_scanned(&layout("", vec![image(1.0)])).await);
        assert!(d.is_scanned(&layout("a b cde fgh", vec![])).await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_falls_back_without_caching() {
        let model = CountingModel::failing();
        let d = detector(model.clone());
        let page = layout(CLEAN, vec![StructuralBlock::text(
            BoundingBox::new(0.0, 0.0, 100.0, 50.0),
            CLEAN,
        )]);

        assert!(!d.is_scanned(&page).await);
        assert!(!d.is_scanned(&page).await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    /// Never answers within any reasonable budget.
    #[derive(Default)]
    struct HangingModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextModel for HangingModel {
        async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("scan".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out_into_the_heuristic() {
        let model = Arc::new(HangingModel::default());
        let config = TriageConfig::default();
        let budget = config.scan_timeout();
        let d = ScanDetector::new(model.clone(), Arc::new(MemoryVerdictCache::new()), config);
        let page = layout(CLEAN, vec![StructuralBlock::text(
            BoundingBox::new(0.0, 0.0, 100.0, 50.0),
            CLEAN,
        )]);

        let start = tokio::time::Instant::now();
        assert!(!d.is_scanned(&page).await);
        let elapsed = start.elapsed();
        assert_eq!(budget, Duration::from_secs(5));
        assert!(elapsed >= budget && elapsed < budget + Duration::from_millis(10), "{elapsed:?}");

        // Timed-out verdicts are not cached.
        assert!(!d.is_scanned(&page).await);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }
}
