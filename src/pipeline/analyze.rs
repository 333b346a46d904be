//! Semantic analysis of page text: page-type classification and material
//! extraction.
//!
//! Both calls absorb model failures. Classification degrades to
//! [`ERROR_LABEL`] so every analysed page ends up labelled; extraction
//! degrades to an empty list so a bad answer records nothing rather than
//! failing the job.

use crate::config::TriageConfig;
use crate::error::ModelError;
use crate::model::NewMaterial;
use crate::pipeline::llm::{ModelRequest, TextModel};
use crate::prompts::{
    classification_prompt, extraction_prompt, PageLabel, ERROR_LABEL, SYSTEM_PROMPT,
    UNKNOWN_MATERIAL,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n?(.*?)\n?```$").unwrap());

pub struct SemanticAnalyzer {
    model: Arc<dyn TextModel>,
    config: TriageConfig,
}

impl SemanticAnalyzer {
    pub fn new(model: Arc<dyn TextModel>, config: TriageConfig) -> Self {
        Self { model, config }
    }

    /// Page-type label for `text`.
    ///
    /// Known labels (English slugs or their Russian forms) are stored as the
    /// canonical slug; anything else is kept lower-cased and trimmed.
    pub async fn classify(&self, text: &str) -> String {
        let request = ModelRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: classification_prompt(text, self.config.classify_prompt_chars),
            max_tokens: self.config.classify_max_tokens,
            temperature: self.config.temperature,
        };

        match self.call(&request, self.config.classify_timeout()).await {
            Ok(answer) => normalise_label(&answer),
            Err(e) => {
                warn!("Classification failed: {}", e);
                ERROR_LABEL.to_string()
            }
        }
    }

    /// Materials mentioned in `text`.
    pub async fn extract_materials(&self, text: &str) -> Vec<NewMaterial> {
        let request = ModelRequest {
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: extraction_prompt(text, self.config.extract_prompt_chars),
            max_tokens: self.config.extract_max_tokens,
            temperature: self.config.temperature,
        };

        match self.call(&request, self.config.extract_timeout()).await {
            Ok(answer) => parse_materials(&answer),
            Err(e) => {
                warn!("Material extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn call(&self, request: &ModelRequest, timeout: Duration) -> Result<String, ModelError> {
        tokio::time::timeout(timeout, self.model.complete(request))
            .await
            .map_err(|_| ModelError::Timeout(timeout))?
    }
}

/// Lower-case, trim and map onto a canonical [`PageLabel`] slug when possible.
pub fn normalise_label(answer: &str) -> String {
    let normalised = answer.trim().to_lowercase();
    match PageLabel::parse(&normalised) {
        Some(label) => label.as_str().to_string(),
        None => normalised,
    }
}

/// Parse the extraction answer into materials.
///
/// Accepts a bare JSON array or one wrapped in a Markdown code fence. Any
/// other shape yields an empty list. Non-object entries are ignored; a
/// missing name becomes [`UNKNOWN_MATERIAL`] and missing characteristics an
/// empty map.
pub fn parse_materials(answer: &str) -> Vec<NewMaterial> {
    let trimmed = answer.trim();
    let json = RE_JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let items = match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!("Extraction answer is not a JSON array: {}", kind(&other));
            return Vec::new();
        }
        Err(e) => {
            warn!("Extraction answer is not valid JSON: {}", e);
            return Vec::new();
        }
    };

    let materials: Vec<NewMaterial> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(mut obj) => {
                let name = match obj.remove("name") {
                    Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                    Some(Value::Null) | None => UNKNOWN_MATERIAL.to_string(),
                    Some(Value::String(_)) => UNKNOWN_MATERIAL.to_string(),
                    Some(other) => other.to_string(),
                };
                let characteristics = match obj.remove("characteristics") {
                    Some(Value::Object(map)) => map
                        .into_iter()
                        .filter_map(|(k, v)| stringify(v).map(|v| (k, v)))
                        .collect(),
                    _ => BTreeMap::new(),
                };
                Some(NewMaterial {
                    name,
                    characteristics,
                })
            }
            _ => None,
        })
        .collect();

    debug!("Parsed {} materials", materials.len());
    materials
}

fn stringify(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
