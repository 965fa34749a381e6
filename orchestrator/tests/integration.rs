//! End-to-end scenarios against a fake API Service, no network access.
//! These exercise success, partial failure, total failure, cancellation,
//! invalid synthesis configuration, and rate-limit timing across the full
//! fan-out/fan-in pipeline (orchestrator, rate limiter, file sink, audit
//! logger, and context gatherer wired together exactly as `main` wires
//! them, minus the concrete HTTP provider adapters).

use async_trait::async_trait;
use orchestrator::api_service::{ApiCallError, ApiService, CompletionRequest, CompletionResponse};
use orchestrator::config::RunConfig;
use orchestrator::{Orchestrator, OrchestratorError};
use shared::{ErrorCategory, ProviderId, TokenUsage};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Behavior {
    Succeed,
    Fail(ErrorCategory),
}

/// A model/provider-agnostic stand-in for [`ApiService`]: every model
/// resolves to the same provider unless explicitly marked unknown, and
/// each model's response is configured independently so one test can
/// exercise a mix of successes and failures in a single run.
struct FakeApiService {
    behaviors: HashMap<String, Behavior>,
    unknown_models: HashSet<String>,
    delay: Duration,
    calls: StdMutex<Vec<Instant>>,
    prompts: StdMutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeApiService {
    fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            unknown_models: HashSet::new(),
            delay: Duration::ZERO,
            calls: StdMutex::new(Vec::new()),
            prompts: StdMutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_success(mut self, model: &str) -> Self {
        self.behaviors.insert(model.to_string(), Behavior::Succeed);
        self
    }

    fn with_failure(mut self, model: &str, category: ErrorCategory) -> Self {
        self.behaviors.insert(model.to_string(), Behavior::Fail(category));
        self
    }

    fn with_unknown(mut self, model: &str) -> Self {
        self.unknown_models.insert(model.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiService for FakeApiService {
    fn resolve_provider(&self, model: &str) -> ProviderId {
        if self.unknown_models.contains(model) {
            ProviderId::Unknown
        } else {
            ProviderId::OpenAi
        }
    }

    fn api_key(&self, _provider: ProviderId) -> Option<&str> {
        Some("fake-key")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ApiCallError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Instant::now());
        self.prompts.lock().unwrap().push((request.model.clone(), request.prompt.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.behaviors.get(&request.model) {
            Some(Behavior::Fail(category)) => Err(ApiCallError::new(*category, "simulated failure")),
            _ => Ok(CompletionResponse {
                content: format!("out-{}", request.model),
                finish_reason: "stop".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                },
            }),
        }
    }
}

fn config(dir: &Path, models: &[&str], synthesis: Option<&str>) -> RunConfig {
    let instructions = dir.join("instructions.md");
    std::fs::write(&instructions, "do the thing").unwrap();
    RunConfig {
        instructions,
        output_dir: dir.join("out"),
        models: models.iter().map(|m| m.to_string()).collect(),
        synthesis_model: synthesis.map(String::from),
        include: vec![],
        exclude: vec![],
        roots: vec![],
        concurrency: 0,
        global_rpm: 0,
        per_provider_rpm: HashMap::new(),
        log_level: "error".to_string(),
        audit_log: dir.join("out").join("audit.jsonl"),
        correlation_id: None,
        max_tokens: Some(2048),
        temperature: Some(0.7),
    }
}

#[tokio::test]
async fn s1_three_successes_one_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), &["m1", "m2", "m3"], Some("s1"));
    let api = Arc::new(
        FakeApiService::new()
            .with_success("m1")
            .with_success("m2")
            .with_success("m3")
            .with_success("s1"),
    );

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();
    let result = orchestrator.execute(&cfg, CancellationToken::new()).await.unwrap();

    assert!(result.per_model.iter().all(|m| m.outcome.is_success()));
    assert!(result.synthesis.as_ref().unwrap().outcome.is_success());

    for name in ["m1", "m2", "m3"] {
        assert!(cfg.output_dir.join(format!("{name}.md")).exists());
    }
    assert!(cfg.output_dir.join("s1-synthesis.md").exists());

    let prompts = api.prompts();
    let (_, synthesis_prompt) = prompts.iter().find(|(model, _)| model == "s1").expect("synthesis was called");
    assert!(synthesis_prompt.contains("<model_outputs>"));
    let pos_m1 = synthesis_prompt.find("out-m1").unwrap();
    let pos_m2 = synthesis_prompt.find("out-m2").unwrap();
    let pos_m3 = synthesis_prompt.find("out-m3").unwrap();
    assert!(pos_m1 < pos_m2 && pos_m2 < pos_m3, "model outputs must appear in input order");
}

#[tokio::test]
async fn s2_one_failure_two_successes_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), &["m1", "m2", "m3"], Some("s1"));
    let api = Arc::new(
        FakeApiService::new()
            .with_success("m1")
            .with_failure("m2", ErrorCategory::RateLimit)
            .with_success("m3")
            .with_success("s1"),
    );

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();
    let err = orchestrator.execute(&cfg, CancellationToken::new()).await.unwrap_err();

    assert!(cfg.output_dir.join("m1.md").exists());
    assert!(!cfg.output_dir.join("m2.md").exists());
    assert!(cfg.output_dir.join("m3.md").exists());
    assert!(cfg.output_dir.join("s1-synthesis.md").exists());

    match err {
        OrchestratorError::PartialFailure(failures) => {
            let failed = failures.0.iter().find(|f| f.model == "m2").expect("m2 should be reported as failed");
            assert_eq!(failed.category, ErrorCategory::RateLimit);
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
}

#[tokio::test]
async fn s3_all_failures_no_synthesis_attempted() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), &["m1", "m2"], Some("s1"));
    let api = Arc::new(
        FakeApiService::new()
            .with_failure("m1", ErrorCategory::Server)
            .with_failure("m2", ErrorCategory::Server)
            .with_success("s1"),
    );

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();
    let err = orchestrator.execute(&cfg, CancellationToken::new()).await.unwrap_err();

    assert!(!cfg.output_dir.join("m1.md").exists());
    assert!(!cfg.output_dir.join("m2.md").exists());
    assert!(!cfg.output_dir.join("s1-synthesis.md").exists());
    assert!(api.prompts().iter().all(|(model, _)| model != "s1"), "synthesis must never be attempted");

    match err {
        OrchestratorError::AllModelsFailed(failures) => assert_eq!(failures.0.len(), 2),
        other => panic!("expected AllModelsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn s4_cancellation_during_fan_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), &["m1", "m2", "m3"], None);
    cfg.concurrency = 1;
    cfg.global_rpm = 1;

    let api = Arc::new(
        FakeApiService::new()
            .with_success("m1")
            .with_success("m2")
            .with_success("m3")
            .with_delay(Duration::from_millis(20)),
    );

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();

    let cancel = CancellationToken::new();
    let cancel_trigger = cancel.clone();
    let output_dir = cfg.output_dir.clone();
    tokio::spawn(async move {
        loop {
            let has_md = std::fs::read_dir(&output_dir)
                .map(|entries| entries.filter_map(|e| e.ok()).any(|e| e.file_name().to_string_lossy().ends_with(".md")))
                .unwrap_or(false);
            if has_md {
                cancel_trigger.cancel();
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let err = orchestrator.execute(&cfg, cancel).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Cancelled), "expected Cancelled, got {err:?}");

    let entries: Vec<String> = std::fs::read_dir(&cfg.output_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    let md_files: Vec<&String> = entries.iter().filter(|name| name.ends_with(".md")).collect();
    assert_eq!(md_files.len(), 1, "exactly one model should have written a file before cancellation: {entries:?}");
    assert!(!entries.iter().any(|name| name.contains("synthesis")));
}

#[tokio::test]
async fn s5_unknown_synthesis_model_is_fatal_before_any_call() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), &["m1"], Some("bogus"));
    let api = Arc::new(FakeApiService::new().with_success("m1").with_unknown("bogus"));

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();
    let err = orchestrator.execute(&cfg, CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidRequest { .. }), "expected InvalidRequest, got {err:?}");
    assert!(api.prompts().is_empty(), "no provider call should happen once the synthesis model fails to resolve");
}

#[tokio::test]
async fn s6_rate_limit_timing_and_concurrency_bound() {
    let dir = tempfile::tempdir().unwrap();
    let model_names: Vec<String> = (1..=62).map(|i| format!("m{i}")).collect();
    let model_refs: Vec<&str> = model_names.iter().map(String::as_str).collect();

    let mut cfg = config(dir.path(), &model_refs, None);
    cfg.concurrency = 5;
    cfg.per_provider_rpm.insert(ProviderId::OpenAi, 60);

    let mut builder = FakeApiService::new().with_delay(Duration::from_millis(5));
    for model in &model_names {
        builder = builder.with_success(model);
    }
    let api = Arc::new(builder);

    let orchestrator = Orchestrator::new(&cfg, api.clone() as Arc<dyn ApiService>).await.unwrap();
    let result = orchestrator.execute(&cfg, CancellationToken::new()).await.unwrap();
    assert!(result.per_model.iter().all(|m| m.outcome.is_success()));

    assert!(api.max_concurrent() <= 5, "observed concurrency {} exceeded N_conc", api.max_concurrent());

    let mut calls = api.call_times();
    calls.sort();
    assert_eq!(calls.len(), 62);

    let first_to_60th = calls[59].duration_since(calls[0]);
    assert!(first_to_60th < Duration::from_millis(900), "the first 60 calls should burst through without rate waiting, took {first_to_60th:?}");

    let first_to_61st = calls[60].duration_since(calls[0]);
    assert!(first_to_61st >= Duration::from_millis(900), "the 61st call should wait for the bucket to refill, only took {first_to_61st:?}");
}
