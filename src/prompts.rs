//! Prompts and label vocabulary for the language-model calls.
//!
//! Every prompt the pipeline sends lives here, next to the closed label set
//! the classifier is allowed to answer with, so prompt changes and label
//! changes stay in one place and can be unit-tested without a model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// System message shared by every call.
pub const SYSTEM_PROMPT: &str =
    "You are a specialist in technical documentation. Follow the answer format exactly.";

/// Sentinel label stored when the classification call fails.
pub const ERROR_LABEL: &str = "error";

/// Sentinel material name used when the model omits one.
pub const UNKNOWN_MATERIAL: &str = "unknown";

/// Closed set of page types the classifier may answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageLabel {
    Certificate,
    TitlePage,
    TechnicalSpecification,
    Blank,
    ScanWithoutText,
    Other,
}

impl PageLabel {
    pub const ALL: [PageLabel; 6] = [
        PageLabel::Certificate,
        PageLabel::TitlePage,
        PageLabel::TechnicalSpecification,
        PageLabel::Blank,
        PageLabel::ScanWithoutText,
        PageLabel::Other,
    ];

    /// Canonical slug stored on the page.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageLabel::Certificate => "certificate",
            PageLabel::TitlePage => "title-page",
            PageLabel::TechnicalSpecification => "technical-specification",
            PageLabel::Blank => "blank",
            PageLabel::ScanWithoutText => "scan-without-text",
            PageLabel::Other => "other",
        }
    }

    /// Label as written by the Russian-language deployments.
    pub fn russian(&self) -> &'static str {
        match self {
            PageLabel::Certificate => "сертификат",
            PageLabel::TitlePage => "титульный лист",
            PageLabel::TechnicalSpecification => "техническая характеристика",
            PageLabel::Blank => "пустая",
            PageLabel::ScanWithoutText => "скан без текста",
            PageLabel::Other => "другое",
        }
    }

    /// Match a normalised (trimmed, lower-cased) answer against the slugs and
    /// their Russian forms. Trailing punctuation is tolerated.
    pub fn parse(answer: &str) -> Option<PageLabel> {
        let answer = answer.trim_end_matches(['.', '!', '"', '\'']).trim();
        let spaced = answer.replace(['-', '_'], " ");
        PageLabel::ALL.into_iter().find(|label| {
            answer == label.as_str()
                || spaced == label.as_str().replace('-', " ")
                || answer == label.russian()
        })
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First `max_chars` characters of `text` (Unicode scalar values, not bytes).
pub fn window(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Ask for a binary verdict: was this text produced by a native PDF text
/// layer, or by recognising a scanned image?
pub fn scan_verdict_prompt(text: &str, max_chars: usize) -> String {
    format!(
        "Below is the text layer of one PDF page. Decide whether the page is native \
digital text or a scanned image whose text came from character recognition. \
Answer with exactly one word: text or scan.\n\nText:\n{}",
        window(text, max_chars)
    )
}

/// Ask for exactly one label from [`PageLabel::ALL`].
pub fn classification_prompt(text: &str, max_chars: usize) -> String {
    let labels: Vec<&str> = PageLabel::ALL.iter().map(|l| l.as_str()).collect();
    format!(
        "You classify pages of technical documentation. Based on the text below, \
determine the page type. Possible types: {}. Answer ONLY with one of these \
types, without explanations.\n\nText:\n{}",
        labels.join(", "),
        window(text, max_chars)
    )
}

/// Ask for a JSON array of materials with their characteristics.
pub fn extraction_prompt(text: &str, max_chars: usize) -> String {
    format!(
        r#"You are a quality engineer. Analyse the following text and extract the list of materials with their characteristics.
Answer with a JSON array only, in this format:
[
  {{
    "name": "Steel 12Kh18N10T",
    "characteristics": {{
      "GOST": "5632-72",
      "Grade": "12Kh18N10T",
      "Chromium content": "17-19%",
      "Type": "stainless steel"
    }}
  }}
]
Return [] when the text mentions no materials.

Text:
{}"#,
        window(text, max_chars)
    )
}
