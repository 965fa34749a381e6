//! Concrete provider adapters and the [`HttpApiService`] that dispatches
//! between them by model name prefix.

mod anthropic;
mod gemini;
mod openai;
mod openrouter;

use crate::api_service::{ApiCallError, ApiService, CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use shared::{ErrorCategory, ProviderId};
use std::collections::HashMap;
use std::time::Duration;

/// Resolve a provider from a model name by prefix (`gpt-*` -> OpenAI,
/// `claude-*` -> Anthropic, `gemini-*` -> Gemini). `openrouter/` is an
/// explicit namespace prefix rather than a model-name heuristic, matching
/// how OpenRouter itself qualifies models.
pub fn resolve_provider(model: &str) -> ProviderId {
    let lower = model.to_lowercase();
    if lower.starts_with("openrouter/") {
        ProviderId::OpenRouter
    } else if lower.starts_with("gpt-") || lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("chatgpt") {
        ProviderId::OpenAi
    } else if lower.starts_with("claude") {
        ProviderId::Anthropic
    } else if lower.starts_with("gemini") {
        ProviderId::Gemini
    } else {
        ProviderId::Unknown
    }
}

/// The production [`ApiService`]: a shared [`reqwest::Client`] and a
/// resolved map of provider API keys, read once at startup.
pub struct HttpApiService {
    client: reqwest::Client,
    api_keys: HashMap<ProviderId, String>,
}

impl HttpApiService {
    pub fn new(client: reqwest::Client, api_keys: HashMap<ProviderId, String>) -> Self {
        Self { client, api_keys }
    }

    /// Build the key map by reading each provider's environment variable.
    /// Missing variables are simply absent from the map; `api_key` then
    /// returns `None` for that provider and the caller raises an `Auth`
    /// failure for the one model, rather than failing the whole run.
    pub fn from_env() -> Self {
        let mut api_keys = HashMap::new();
        for provider in [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Gemini, ProviderId::OpenRouter] {
            if let Some(var) = provider.env_var() {
                if let Ok(key) = std::env::var(var) {
                    if !key.is_empty() {
                        api_keys.insert(provider, key);
                    }
                }
            }
        }
        Self {
            client: reqwest::Client::new(),
            api_keys,
        }
    }
}

#[async_trait]
impl ApiService for HttpApiService {
    fn resolve_provider(&self, model: &str) -> ProviderId {
        resolve_provider(model)
    }

    fn api_key(&self, provider: ProviderId) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
        let provider = self.resolve_provider(&request.model);
        let api_key = self
            .api_key(provider)
            .ok_or_else(|| ApiCallError::new(ErrorCategory::Auth, format!("no API key configured for {provider}")))?;

        match provider {
            ProviderId::OpenAi => openai::call(&self.client, api_key, &request).await,
            ProviderId::Anthropic => anthropic::call(&self.client, api_key, &request).await,
            ProviderId::Gemini => gemini::call(&self.client, api_key, &request).await,
            ProviderId::OpenRouter => openrouter::call(&self.client, api_key, &request).await,
            ProviderId::Unknown => Err(ApiCallError::new(
                ErrorCategory::InvalidRequest,
                format!("unrecognized model '{}': no provider matches this name", request.model),
            )),
        }
    }
}
