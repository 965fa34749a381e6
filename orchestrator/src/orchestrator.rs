//! C7: the top-level coordinator. Composes the prompt, fans a
//! [`ModelProcessor`] out across every configured model, fans the
//! outcomes back in preserving input order, and optionally runs one more
//! Processor pass for synthesis.

use crate::api_service::ApiService;
use crate::audit::{AuditEntry, AuditLogger, Operation, Status};
use crate::config::RunConfig;
use crate::context::{self, GatheredFile};
use crate::error::{ModelFailure, ModelFailures, OrchestratorError, OrchestratorResult};
use crate::file_sink::FileSink;
use crate::outcome::{order_outcomes, FailureOutcome, Outcome, ModelOutcome, RunResult, RunSummary};
use crate::processor::{ModelProcessor, ProcessorParams};
use crate::prompt;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::sanitize::{check_injective, model_filename, synthesis_filename};
use shared::{correlation_info, CorrelationId, ErrorCategory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct Orchestrator {
    api_service: Arc<dyn ApiService>,
    audit: Arc<AuditLogger>,
    file_sink: Arc<FileSink>,
    rate_limiter: Arc<RateLimiter>,
    correlation_id: CorrelationId,
}

impl Orchestrator {
    pub async fn new(config: &RunConfig, api_service: Arc<dyn ApiService>) -> OrchestratorResult<Self> {
        let correlation_id = match &config.correlation_id {
            Some(id) => CorrelationId::from_string(id.clone()),
            None => CorrelationId::generate(),
        };

        let audit = Arc::new(
            AuditLogger::open(&config.audit_log, correlation_id.as_str())
                .await
                .map_err(|e| OrchestratorError::config(e.to_string()))?,
        );

        let file_sink = Arc::new(FileSink::new(config.output_dir.clone(), correlation_id.as_str().to_string()));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            global_concurrency: config.concurrency,
            global_rpm: config.global_rpm,
            per_provider_rpm: config.per_provider_rpm.clone(),
        }));

        Ok(Self {
            api_service,
            audit,
            file_sink,
            rate_limiter,
            correlation_id,
        })
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Validate, compose the prompt, fan out, optionally synthesize, and
    /// report the run's outcome end to end.
    pub async fn execute(&self, config: &RunConfig, cancel: CancellationToken) -> OrchestratorResult<RunResult> {
        let run_start = Instant::now();
        correlation_info!(self.correlation_id, "orchestrator run starting");

        self.audit
            .log(AuditEntry::new(Operation::ExecuteStart, Status::InProgress).with_inputs(serde_json::json!({"models": config.models})))
            .await
            .ok();

        self.validate(config)?;

        let instructions = self.read_instructions(config).await?;
        let files = self.gather_context(config).await?;
        let prompt_text = prompt::compose(&instructions, &files);

        let params = ProcessorParams {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_timeout: Duration::from_secs(120),
        };

        let by_model = self.run_processors(&config.models, &prompt_text, &params, &cancel).await;
        let per_model = order_outcomes(&config.models, by_model);

        let success_count = per_model.iter().filter(|m| m.outcome.is_success()).count();
        let failure_count = per_model.len() - success_count;

        if cancel.is_cancelled() {
            self.emit_execute_end(&per_model, None, run_start).await;
            return Err(OrchestratorError::Cancelled);
        }

        if success_count == 0 && failure_count > 0 {
            let failures = collect_failures(&per_model);
            self.emit_execute_end(&per_model, None, run_start).await;
            return Err(OrchestratorError::AllModelsFailed(ModelFailures(failures)));
        }

        let synthesis = if let Some(synthesis_model) = &config.synthesis_model {
            Some(self.run_synthesis(synthesis_model, &instructions, &files, &per_model, &params, &cancel).await)
        } else {
            None
        };

        if cancel.is_cancelled() {
            self.emit_execute_end(&per_model, synthesis.as_ref(), run_start).await;
            return Err(OrchestratorError::Cancelled);
        }

        let result = RunResult {
            per_model: per_model.clone(),
            synthesis: synthesis.clone(),
        };

        self.write_run_summary(&result, run_start).await;
        self.emit_execute_end(&per_model, synthesis.as_ref(), run_start).await;

        let failures = collect_failures(&per_model);
        match (failure_count, synthesis) {
            (0, None) => Ok(result),
            (0, Some(synth)) if synth.outcome.is_success() => Ok(result),
            (0, Some(synth)) => {
                let message = match &synth.outcome {
                    Outcome::Failure(f) => f.message.clone(),
                    Outcome::Success(_) => unreachable!(),
                };
                let category = match &synth.outcome {
                    Outcome::Failure(f) => f.category,
                    Outcome::Success(_) => unreachable!(),
                };
                Err(OrchestratorError::PartialFailure(ModelFailures(vec![ModelFailure {
                    model: synth.model.clone(),
                    category,
                    message,
                }])))
            }
            _ => Err(OrchestratorError::PartialFailure(ModelFailures(failures))),
        }
    }

    fn validate(&self, config: &RunConfig) -> OrchestratorResult<()> {
        if config.models.is_empty() {
            return Err(OrchestratorError::invalid_request("no models configured"));
        }

        let mut names: Vec<&str> = config.models.iter().map(String::as_str).collect();
        if let Some(synthesis) = &config.synthesis_model {
            names.push(synthesis.as_str());
        }
        check_injective(names).map_err(OrchestratorError::invalid_request)?;

        for model in &config.models {
            if matches!(self.api_service.resolve_provider(model), shared::ProviderId::Unknown) {
                return Err(OrchestratorError::invalid_request(format!("unrecognized model: {model}")));
            }
        }
        if let Some(synthesis) = &config.synthesis_model {
            if matches!(self.api_service.resolve_provider(synthesis), shared::ProviderId::Unknown) {
                return Err(OrchestratorError::invalid_request(format!("unrecognized synthesis model: {synthesis}")));
            }
        }

        if !config.instructions.exists() {
            return Err(OrchestratorError::invalid_request(format!(
                "instructions file not readable: {}",
                config.instructions.display()
            )));
        }

        Ok(())
    }

    async fn read_instructions(&self, config: &RunConfig) -> OrchestratorResult<String> {
        self.audit
            .log(AuditEntry::new(Operation::ReadInstructions, Status::InProgress))
            .await
            .ok();
        tokio::fs::read_to_string(&config.instructions).await.map_err(OrchestratorError::from)
    }

    async fn gather_context(&self, config: &RunConfig) -> OrchestratorResult<Vec<GatheredFile>> {
        self.audit
            .log(AuditEntry::new(Operation::GatherContextStart, Status::InProgress))
            .await
            .ok();

        let result = context::gather(&config.roots, &config.include, &config.exclude)
            .map_err(|e| OrchestratorError::invalid_request(e.to_string()))?;

        self.audit
            .log(
                AuditEntry::new(Operation::GatherContextEnd, Status::Success).with_outputs(serde_json::json!({
                    "files_included": result.stats.files_included,
                    "files_skipped": result.stats.files_skipped,
                    "total_bytes": result.stats.total_bytes,
                })),
            )
            .await
            .ok();

        Ok(result.files)
    }

    /// Launch one Processor task per model in parallel, all sharing the
    /// same cancellation token, and collect outcomes keyed by model name.
    async fn run_processors(&self, models: &[String], prompt_text: &str, params: &ProcessorParams, cancel: &CancellationToken) -> HashMap<String, Outcome> {
        let processor = Arc::new(ModelProcessor::new(
            self.api_service.clone(),
            self.rate_limiter.clone(),
            self.file_sink.clone(),
            self.audit.clone(),
        ));

        let mut set: JoinSet<Outcome> = JoinSet::new();
        let mut task_models = HashMap::with_capacity(models.len());
        for model in models {
            let processor = processor.clone();
            let model_owned = model.clone();
            let prompt_text = prompt_text.to_string();
            let params = params.clone();
            let cancel = cancel.clone();
            let filename = model_filename(model, "md");
            let handle = set.spawn(async move { processor.process(&model_owned, &filename, &prompt_text, &params, &cancel).await });
            task_models.insert(handle.id(), model.clone());
        }

        let mut results = HashMap::with_capacity(models.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    if let Some(model) = task_models.remove(&id) {
                        results.insert(model, outcome);
                    }
                }
                Err(join_err) => {
                    // A task that panicked or was aborted still owes the
                    // fan-in exactly one outcome, per the Processor contract.
                    if let Some(model) = task_models.remove(&join_err.id()) {
                        let message = if join_err.is_panic() {
                            "model processor task panicked".to_string()
                        } else {
                            "model processor task was aborted before completing".to_string()
                        };
                        results.insert(
                            model,
                            Outcome::Failure(FailureOutcome {
                                category: ErrorCategory::Server,
                                message,
                                retriable: false,
                                duration: Duration::default(),
                            }),
                        );
                    }
                }
            }
        }
        results
    }

    /// Compose the synthesis prompt from successful outputs in input
    /// order and run one more Processor pass.
    async fn run_synthesis(
        &self,
        synthesis_model: &str,
        instructions: &str,
        files: &[GatheredFile],
        per_model: &[ModelOutcome],
        params: &ProcessorParams,
        cancel: &CancellationToken,
    ) -> ModelOutcome {
        self.audit
            .log(AuditEntry::new(Operation::SynthesisStart, Status::InProgress).with_inputs(serde_json::json!({"model": synthesis_model})))
            .await
            .ok();

        let synthesis_prompt = prompt::compose_synthesis(instructions, files, per_model);
        let filename = synthesis_filename(synthesis_model, "md");

        let processor = ModelProcessor::new(self.api_service.clone(), self.rate_limiter.clone(), self.file_sink.clone(), self.audit.clone());
        let outcome = processor.process(synthesis_model, &filename, &synthesis_prompt, params, cancel).await;

        let status = if outcome.is_success() { Status::Success } else { Status::Failure };
        self.audit
            .log(AuditEntry::new(Operation::SynthesisEnd, status).with_inputs(serde_json::json!({"model": synthesis_model})))
            .await
            .ok();

        ModelOutcome {
            model: synthesis_model.to_string(),
            outcome,
        }
    }

    async fn write_run_summary(&self, result: &RunResult, run_start: Instant) {
        let summary = RunSummary::from_result(self.correlation_id.as_str(), result, run_start.elapsed());
        if let Ok(json) = serde_json::to_string_pretty(&summary) {
            let _ = self.file_sink.save("run-summary.json", &json).await;
        }
    }

    async fn emit_execute_end(&self, per_model: &[ModelOutcome], synthesis: Option<&ModelOutcome>, run_start: Instant) {
        let success_count = per_model.iter().filter(|m| m.outcome.is_success()).count();
        let _ = self
            .audit
            .log(
                AuditEntry::new(Operation::ExecuteEnd, Status::Success).with_outputs(serde_json::json!({
                    "success_count": success_count,
                    "failure_count": per_model.len() - success_count,
                    "synthesis_attempted": synthesis.is_some(),
                    "duration_ms": run_start.elapsed().as_millis(),
                })),
            )
            .await;
        self.audit.close().await;
    }
}

fn collect_failures(per_model: &[ModelOutcome]) -> Vec<ModelFailure> {
    per_model
        .iter()
        .filter_map(|m| match &m.outcome {
            Outcome::Failure(f) => Some(ModelFailure {
                model: m.model.clone(),
                category: f.category,
                message: f.message.clone(),
            }),
            Outcome::Success(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_service::{ApiCallError, CompletionRequest, CompletionResponse};
    use async_trait::async_trait;
    use shared::{ProviderId, TokenUsage};

    struct PanicsForModel {
        panic_model: String,
    }

    #[async_trait]
    impl ApiService for PanicsForModel {
        fn resolve_provider(&self, _model: &str) -> ProviderId {
            ProviderId::OpenAi
        }

        fn api_key(&self, _provider: ProviderId) -> Option<&str> {
            Some("fake-key")
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
            if request.model == self.panic_model {
                panic!("simulated provider adapter panic");
            }
            Ok(CompletionResponse {
                content: format!("out-{}", request.model),
                finish_reason: "stop".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                },
            })
        }
    }

    #[tokio::test]
    async fn run_processors_converts_a_panicking_task_into_a_failure_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let api_service: Arc<dyn ApiService> = Arc::new(PanicsForModel { panic_model: "m2".to_string() });
        let audit = Arc::new(AuditLogger::open(dir.path().join("audit.jsonl"), "run-1").await.unwrap());
        let file_sink = Arc::new(FileSink::new(dir.path().to_path_buf(), "run-1".to_string()));
        let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));

        let orchestrator = Orchestrator {
            api_service,
            audit,
            file_sink,
            rate_limiter,
            correlation_id: CorrelationId::generate(),
        };

        let models = vec!["m1".to_string(), "m2".to_string(), "m3".to_string()];
        let cancel = CancellationToken::new();
        let params = ProcessorParams::default();

        let by_model = orchestrator.run_processors(&models, "<instructions></instructions>", &params, &cancel).await;

        assert_eq!(by_model.len(), 3);
        assert!(by_model["m1"].is_success());
        assert!(by_model["m3"].is_success());
        match &by_model["m2"] {
            Outcome::Failure(f) => assert_eq!(f.category, ErrorCategory::Server),
            Outcome::Success(_) => panic!("expected the panicking task to surface as a failure"),
        }
    }
}
