//! Text-model access: one seam, two backends.
//!
//! Scan verdicts, classification and material extraction all go through
//! [`TextModel`]. Two implementations are provided:
//!
//! * [`ProviderModel`] wraps any edgequake-llm [`LLMProvider`] (OpenAI,
//!   Anthropic, Ollama, …) and sends a system + user chat.
//! * [`CompletionEndpoint`] POSTs a bare completion payload
//!   (`{"prompt","max_tokens"}`) with a bearer token, for self-hosted
//!   models exposed behind a plain HTTP endpoint.
//!
//! Neither applies a timeout or retries: callers own the time budget and
//! degrade locally when a call fails.

use crate::config::TriageConfig;
use crate::error::{ModelError, TriageError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One request to a text model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

/// A language model answering a prompt with free text.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// [`TextModel`] over an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TextModel for ProviderModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(request.prompt.as_str()));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ModelError::Provider(e.to_string()))?;

        debug!(
            "Model answered: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// [`TextModel`] over a plain HTTP completion endpoint.
///
/// The system message, when present, is prepended to the prompt since the
/// payload has no separate slot for it.
pub struct CompletionEndpoint {
    client: Client,
    url: String,
    token: Option<String>,
}

impl CompletionEndpoint {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self, TriageError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TriageError::Internal(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl TextModel for CompletionEndpoint {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let prompt = match request.system {
            Some(ref system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        let body = CompletionRequest {
            prompt: &prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut http = self.client.post(&self.url).json(&body);
        if let Some(ref token) = self.token {
            http = http.bearer_auth(token);
        }

        let resp = http
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;
        first_choice_text(parsed)
    }
}

/// `choices[0].text`, falling back to `choices[0].message.content`.
fn first_choice_text(resp: CompletionResponse) -> Result<String, ModelError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Malformed("response has no choices".into()))?;
    choice
        .text
        .or(choice.message.map(|m| m.content))
        .ok_or_else(|| ModelError::Malformed("choice carries no text".into()))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn TextModel>, TriageError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TriageError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderModel::new(provider)))
}

/// Resolve the text model, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`;
/// 2. a completion endpoint in `config.completion_url`;
/// 3. `config.provider_name` with `config.model` (or [`DEFAULT_MODEL`]);
/// 4. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 5. OpenAI, when `OPENAI_API_KEY` is set;
/// 6. whatever edgequake-llm auto-detects from the environment.
pub fn resolve_model(config: &TriageConfig) -> Result<Arc<dyn TextModel>, TriageError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderModel::new(Arc::clone(provider))));
    }

    if let Some(ref url) = config.completion_url {
        info!("Using completion endpoint {}", url);
        let endpoint = CompletionEndpoint::new(url.clone(), config.completion_token.clone())?;
        return Ok(Arc::new(endpoint));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TriageError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set LLM_CLASSIFY_URL, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderModel::new(llm_provider)))
}
