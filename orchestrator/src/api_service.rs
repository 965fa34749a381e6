//! C2: API Service — the trait boundary between the Model Processor and
//! concrete provider HTTP clients.

use async_trait::async_trait;
use shared::{ErrorCategory, ProviderId, TokenUsage};
use std::time::Duration;

/// One completed call to a provider, independent of which provider served
/// it.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

/// A classified failure from a provider call, already mapped onto the
/// shared error taxonomy so the Model Processor never has to know about
/// provider-specific status codes or error bodies.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{category:?}: {message}")]
pub struct ApiCallError {
    pub category: ErrorCategory,
    pub message: String,
    pub retriable: bool,
}

impl ApiCallError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let retriable = matches!(category, ErrorCategory::RateLimit | ErrorCategory::Server);
        Self {
            category,
            message: message.into(),
            retriable,
        }
    }
}

/// Parameters for a single completion request. `max_tokens` and
/// `temperature` are request-shaping knobs, already merged from per-model
/// defaults and any run-level override; `timeout` bounds the HTTP round
/// trip.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// A single named request parameter's value, for `validate_parameter`.
/// `temperature` is checked as a float, `max_tokens` as an integer; any
/// other parameter name passes through unchecked regardless of which
/// variant carries it.
#[derive(Debug, Clone, Copy)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

/// A model's default request parameters, applied before any run-level
/// override. `max_tokens` here is already within the model's
/// `max_output_tokens`.
#[derive(Debug, Clone, Copy)]
pub struct ModelParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Static facts about one model: which provider serves it, the provider's
/// own model identifier, its context/output token ceilings, and the
/// default request parameters the Model Processor merges with any
/// run-level override before dispatch.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: ProviderId,
    pub api_model_id: String,
    pub context_window: u32,
    pub max_output_tokens: u32,
    pub default_params: ModelParams,
}

/// Generic per-provider bounds used when a concrete `ApiService` has no
/// finer-grained per-model data of its own. Context windows and output
/// caps are conservative round numbers for each provider's current model
/// family, not a per-model lookup table.
fn default_model_info(provider: ProviderId, model: &str) -> ModelInfo {
    let (context_window, max_output_tokens) = match provider {
        ProviderId::OpenAi => (128_000, 16_384),
        ProviderId::Anthropic => (200_000, 8_192),
        ProviderId::Gemini => (1_000_000, 8_192),
        ProviderId::OpenRouter => (32_000, 4_096),
        ProviderId::Unknown => (0, 0),
    };
    ModelInfo {
        provider,
        api_model_id: model.to_string(),
        context_window,
        max_output_tokens,
        default_params: ModelParams {
            temperature: 0.7,
            max_tokens: max_output_tokens.min(4_096).max(1),
        },
    }
}

/// Validate one named parameter against a model's bounds. `temperature`
/// must be a float in `[0, 1]`; `max_tokens` must be a positive integer
/// not exceeding the model's `max_output_tokens`. Any other parameter name
/// passes through unchecked, per the parameter contract.
pub fn validate_param(info: &ModelInfo, name: &str, value: ParamValue) -> Result<(), String> {
    match (name, value) {
        ("temperature", ParamValue::Float(t)) => {
            if (0.0..=1.0).contains(&t) {
                Ok(())
            } else {
                Err(format!("temperature must be within [0, 1], got {t}"))
            }
        }
        ("max_tokens", ParamValue::Int(n)) => {
            if n > 0 && (n as u64) <= info.max_output_tokens as u64 {
                Ok(())
            } else {
                Err(format!(
                    "max_tokens must be a positive integer not exceeding {} for {}, got {n}",
                    info.max_output_tokens, info.api_model_id
                ))
            }
        }
        _ => Ok(()),
    }
}

/// Resolves which provider serves a model name and performs the HTTP
/// exchange, returning a response already classified onto the shared
/// error taxonomy. Implementations must never panic on a malformed
/// response body — malformed bodies map to `ErrorCategory::EmptyResponse`
/// or `ErrorCategory::Server`, never a crash.
#[async_trait]
pub trait ApiService: Send + Sync {
    /// Identify which provider a model name belongs to, e.g.
    /// `"gpt-4o"` -> `ProviderId::OpenAi`. Unrecognized prefixes resolve to
    /// `ProviderId::Unknown`, which `complete` must reject as
    /// `ErrorCategory::InvalidRequest` rather than guessing an endpoint.
    fn resolve_provider(&self, model: &str) -> ProviderId;

    /// Full per-model facts used to merge default request parameters
    /// before dispatch. The default implementation derives generic
    /// per-provider bounds from `resolve_provider`; a concrete service with
    /// real per-model data (context windows that vary by model generation,
    /// say) can override this directly.
    fn resolve_model(&self, model: &str) -> ModelInfo {
        default_model_info(self.resolve_provider(model), model)
    }

    /// Look up the API key for a provider from this service's key store.
    /// Returns `None` when the corresponding environment variable was
    /// unset at startup: a missing key is a per-model `Auth` failure, not
    /// a fatal run error.
    fn api_key(&self, provider: ProviderId) -> Option<&str>;

    /// Validate one request parameter against this model's bounds before
    /// it is sent. The default implementation checks the two recognized
    /// parameters, `temperature` and `max_tokens`, against `resolve_model`.
    fn validate_parameter(&self, model: &str, name: &str, value: ParamValue) -> Result<(), String> {
        validate_param(&self.resolve_model(model), name, value)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiCallError>;
}

/// Classify an HTTP status code the way every provider adapter does: the
/// status-code-to-category mapping is identical across providers even
/// though the request/response bodies are not.
pub fn classify_status(status: u16, body_snippet: &str) -> ApiCallError {
    match status {
        401 | 403 => ApiCallError::new(ErrorCategory::Auth, format!("authentication rejected ({status})")),
        429 => ApiCallError::new(ErrorCategory::RateLimit, "rate limit exceeded"),
        413 | 400 if body_snippet.to_lowercase().contains("context") || body_snippet.to_lowercase().contains("token") => {
            ApiCallError::new(ErrorCategory::InputLimit, "prompt exceeds model context window")
        }
        400 => ApiCallError::new(ErrorCategory::InvalidRequest, format!("bad request: {body_snippet}")),
        500..=599 => ApiCallError::new(ErrorCategory::Server, format!("server error ({status})")),
        _ => ApiCallError::new(ErrorCategory::Server, format!("unexpected status {status}: {body_snippet}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_401_and_403_to_auth() {
        assert_eq!(classify_status(401, "").category, ErrorCategory::Auth);
        assert_eq!(classify_status(403, "").category, ErrorCategory::Auth);
    }

    #[test]
    fn maps_429_to_rate_limit_and_retriable() {
        let err = classify_status(429, "");
        assert_eq!(err.category, ErrorCategory::RateLimit);
        assert!(err.retriable);
    }

    #[test]
    fn maps_5xx_to_server_and_retriable() {
        let err = classify_status(503, "");
        assert_eq!(err.category, ErrorCategory::Server);
        assert!(err.retriable);
    }

    #[test]
    fn maps_context_length_body_to_input_limit() {
        let err = classify_status(400, "maximum context length exceeded for this token count");
        assert_eq!(err.category, ErrorCategory::InputLimit);
    }

    #[test]
    fn temperature_outside_unit_range_is_rejected() {
        let info = default_model_info(ProviderId::OpenAi, "gpt-4o");
        assert!(validate_param(&info, "temperature", ParamValue::Float(0.5)).is_ok());
        assert!(validate_param(&info, "temperature", ParamValue::Float(1.5)).is_err());
        assert!(validate_param(&info, "temperature", ParamValue::Float(-0.1)).is_err());
    }

    #[test]
    fn max_tokens_must_be_positive_and_within_model_ceiling() {
        let info = default_model_info(ProviderId::OpenAi, "gpt-4o");
        assert!(validate_param(&info, "max_tokens", ParamValue::Int(1)).is_ok());
        assert!(validate_param(&info, "max_tokens", ParamValue::Int(0)).is_err());
        assert!(validate_param(&info, "max_tokens", ParamValue::Int(info.max_output_tokens as i64 + 1)).is_err());
    }

    #[test]
    fn unrecognized_parameter_name_passes_through() {
        let info = default_model_info(ProviderId::OpenAi, "gpt-4o");
        assert!(validate_param(&info, "top_p", ParamValue::Float(5.0)).is_ok());
    }

    #[test]
    fn unknown_provider_has_zero_output_ceiling() {
        let info = default_model_info(ProviderId::Unknown, "mystery");
        assert!(validate_param(&info, "max_tokens", ParamValue::Int(1)).is_err());
    }
}
