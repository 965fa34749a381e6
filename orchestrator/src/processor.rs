//! C6: Model Processor — the single-model pipeline: acquire a rate-limit
//! ticket, call the API Service, post-process, write the output file, emit
//! audit events. Produces exactly one [`Outcome`] per invocation, never
//! both a file write and a failure.

use crate::api_service::{ApiService, CompletionRequest, ParamValue};
use crate::audit::{AuditEntry, AuditLogger, Operation, Status};
use crate::file_sink::FileSink;
use crate::outcome::{FailureOutcome, Outcome, SuccessOutcome};
use crate::rate_limiter::RateLimiter;
use crate::sanitize::model_filename;
use shared::ErrorCategory;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Run-level overrides for the two recognized request parameters. `None`
/// leaves the model's own default in place; a run-level value, when
/// present, always wins over the per-model default.
#[derive(Debug, Clone)]
pub struct ProcessorParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub request_timeout: Duration,
}

impl Default for ProcessorParams {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ModelProcessor {
    api_service: Arc<dyn ApiService>,
    rate_limiter: Arc<RateLimiter>,
    file_sink: Arc<FileSink>,
    audit: Arc<AuditLogger>,
}

impl ModelProcessor {
    pub fn new(api_service: Arc<dyn ApiService>, rate_limiter: Arc<RateLimiter>, file_sink: Arc<FileSink>, audit: Arc<AuditLogger>) -> Self {
        Self {
            api_service,
            rate_limiter,
            file_sink,
            audit,
        }
    }

    /// Run the pipeline for one model against an already-composed prompt.
    /// `filename` lets the caller reuse this processor for both a normal
    /// model output (`sanitize(model).md`) and a synthesis output
    /// (`sanitize(model)-synthesis.md`) without duplicating the pipeline.
    pub async fn process(&self, model: &str, filename: &str, prompt: &str, params: &ProcessorParams, cancel: &CancellationToken) -> Outcome {
        let start = Instant::now();

        let _ = self
            .audit
            .log(AuditEntry::new(Operation::ModelProcessingStart, Status::InProgress).with_inputs(serde_json::json!({"model": model})))
            .await;

        let outcome = self.run(model, filename, prompt, params, cancel, start).await;

        let (status, error_json) = match &outcome {
            Outcome::Success(_) => (Status::Success, None),
            Outcome::Failure(f) => (
                Status::Failure,
                Some(serde_json::json!({"message": f.message, "type": f.category.as_str()})),
            ),
        };
        let mut entry = AuditEntry::new(Operation::ModelProcessingEnd, status).with_inputs(serde_json::json!({"model": model}));
        if let Some(error) = error_json {
            entry = entry.with_error(error["message"].as_str().unwrap_or(""), error["type"].as_str().unwrap_or(""));
        }
        let _ = self.audit.log(entry).await;

        outcome
    }

    async fn run(&self, model: &str, filename: &str, prompt: &str, params: &ProcessorParams, cancel: &CancellationToken, start: Instant) -> Outcome {
        let model_info = self.api_service.resolve_model(model);
        if model_info.provider == shared::ProviderId::Unknown {
            return fail(ErrorCategory::InvalidRequest, format!("model '{model}' does not resolve to any known provider"), false, start);
        }

        let temperature = params.temperature.unwrap_or(model_info.default_params.temperature);
        let max_tokens = params.max_tokens.unwrap_or(model_info.default_params.max_tokens);

        if let Err(message) = self.api_service.validate_parameter(model, "temperature", ParamValue::Float(temperature as f64)) {
            return fail(ErrorCategory::InvalidRequest, message, false, start);
        }
        if let Err(message) = self.api_service.validate_parameter(model, "max_tokens", ParamValue::Int(max_tokens as i64)) {
            return fail(ErrorCategory::InvalidRequest, message, false, start);
        }

        let ticket = match self.rate_limiter.acquire(model_info.provider, cancel).await {
            Ok(ticket) => ticket,
            Err(_) => return fail(ErrorCategory::Cancelled, "cancelled while waiting for rate-limit admission", false, start),
        };

        let request = CompletionRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
            timeout: params.request_timeout,
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                drop(ticket);
                return fail(ErrorCategory::Cancelled, "cancelled during provider call", false, start);
            }
            result = self.api_service.complete(request) => result,
        };
        drop(ticket);

        let response = match response {
            Ok(response) => response,
            Err(err) => return fail(err.category, err.message, err.retriable, start),
        };

        if response.content.trim().is_empty() {
            return fail(ErrorCategory::EmptyResponse, "provider returned empty content after post-processing", false, start);
        }

        let _ = self
            .audit
            .log(AuditEntry::new(Operation::SaveOutputStart, Status::InProgress).with_inputs(serde_json::json!({"model": model, "filename": filename})))
            .await;

        if let Err(err) = self.file_sink.save(filename, &response.content).await {
            let _ = self
                .audit
                .log(
                    AuditEntry::new(Operation::SaveOutputEnd, Status::Failure)
                        .with_inputs(serde_json::json!({"model": model, "filename": filename}))
                        .with_error(err.to_string(), ErrorCategory::Io.as_str()),
                )
                .await;
            return fail(ErrorCategory::Io, err.to_string(), false, start);
        }

        let _ = self
            .audit
            .log(AuditEntry::new(Operation::SaveOutputEnd, Status::Success).with_inputs(serde_json::json!({"model": model, "filename": filename})))
            .await;

        Outcome::Success(SuccessOutcome {
            content: response.content,
            finish_reason: response.finish_reason,
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            duration: start.elapsed(),
        })
    }
}

fn fail(category: ErrorCategory, message: impl Into<String>, retriable: bool, start: Instant) -> Outcome {
    Outcome::Failure(FailureOutcome {
        category,
        message: message.into(),
        retriable,
        duration: start.elapsed(),
    })
}

pub fn output_filename(model: &str) -> String {
    model_filename(model, "md")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_service::{ApiCallError, CompletionResponse};
    use crate::rate_limiter::RateLimiterConfig;
    use async_trait::async_trait;
    use shared::{ProviderId, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApiService {
        calls: AtomicUsize,
        behavior: FakeBehavior,
    }

    enum FakeBehavior {
        Succeed,
        Fail(ErrorCategory),
        EmptyContent,
    }

    #[async_trait]
    impl ApiService for FakeApiService {
        fn resolve_provider(&self, model: &str) -> ProviderId {
            if model == "unknown-model" {
                ProviderId::Unknown
            } else {
                ProviderId::OpenAi
            }
        }

        fn api_key(&self, _provider: ProviderId) -> Option<&str> {
            Some("key")
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                FakeBehavior::Succeed => Ok(CompletionResponse {
                    content: "result content".to_string(),
                    finish_reason: "stop".to_string(),
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                    },
                }),
                FakeBehavior::Fail(category) => Err(ApiCallError::new(*category, "simulated failure")),
                FakeBehavior::EmptyContent => Ok(CompletionResponse {
                    content: String::new(),
                    finish_reason: "stop".to_string(),
                    usage: TokenUsage::default(),
                }),
            }
        }
    }

    async fn new_processor(behavior: FakeBehavior, dir: &std::path::Path) -> ModelProcessor {
        let api_service = Arc::new(FakeApiService {
            calls: AtomicUsize::new(0),
            behavior,
        });
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
        let file_sink = Arc::new(FileSink::new(dir.to_path_buf(), "test-run".to_string()));
        let audit = Arc::new(AuditLogger::open(dir.join("audit.jsonl"), "test-run").await.unwrap());
        ModelProcessor::new(api_service, rate_limiter, file_sink, audit)
    }

    #[tokio::test]
    async fn successful_call_writes_file_and_returns_success() {
        let dir = tempfile::tempdir().unwrap();
        let processor = new_processor(FakeBehavior::Succeed, dir.path()).await;
        let cancel = CancellationToken::new();

        let outcome = processor
            .process("gpt-4o", "gpt-4o.md", "<instructions></instructions>", &ProcessorParams::default(), &cancel)
            .await;

        assert!(outcome.is_success());
        let content = tokio::fs::read_to_string(dir.path().join("gpt-4o.md")).await.unwrap();
        assert_eq!(content, "result content");
    }

    #[tokio::test]
    async fn failed_call_does_not_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let processor = new_processor(FakeBehavior::Fail(ErrorCategory::RateLimit), dir.path()).await;
        let cancel = CancellationToken::new();

        let outcome = processor
            .process("gpt-4o", "gpt-4o.md", "<instructions></instructions>", &ProcessorParams::default(), &cancel)
            .await;

        assert!(!outcome.is_success());
        assert!(!dir.path().join("gpt-4o.md").exists());
    }

    #[tokio::test]
    async fn empty_content_is_a_failure_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let processor = new_processor(FakeBehavior::EmptyContent, dir.path()).await;
        let cancel = CancellationToken::new();

        let outcome = processor
            .process("gpt-4o", "gpt-4o.md", "<instructions></instructions>", &ProcessorParams::default(), &cancel)
            .await;

        match outcome {
            Outcome::Failure(f) => assert_eq!(f.category, ErrorCategory::EmptyResponse),
            Outcome::Success(_) => panic!("expected failure"),
        }
        assert!(!dir.path().join("gpt-4o.md").exists());
    }

    #[tokio::test]
    async fn unknown_model_is_invalid_request_without_calling_api() {
        let dir = tempfile::tempdir().unwrap();
        let processor = new_processor(FakeBehavior::Succeed, dir.path()).await;
        let cancel = CancellationToken::new();

        let outcome = processor
            .process("unknown-model", "unknown-model.md", "<instructions></instructions>", &ProcessorParams::default(), &cancel)
            .await;

        match outcome {
            Outcome::Failure(f) => assert_eq!(f.category, ErrorCategory::InvalidRequest),
            Outcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_context_yields_cancelled_failure() {
        let dir = tempfile::tempdir().unwrap();
        let processor = new_processor(FakeBehavior::Succeed, dir.path()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = processor
            .process("gpt-4o", "gpt-4o.md", "<instructions></instructions>", &ProcessorParams::default(), &cancel)
            .await;

        match outcome {
            Outcome::Failure(f) => assert_eq!(f.category, ErrorCategory::Cancelled),
            Outcome::Success(_) => panic!("expected cancellation"),
        }
        assert!(!dir.path().join("gpt-4o.md").exists());
    }
}
