//! The per-model outcome and aggregate run result data model.

use shared::ErrorCategory;
use std::collections::HashMap;
use std::time::Duration;

/// The terminal state of one Model Processor task. A Processor produces
/// exactly one of these, never both halves, never neither.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(SuccessOutcome),
    Failure(FailureOutcome),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

#[derive(Debug, Clone)]
pub struct SuccessOutcome {
    pub content: String,
    pub finish_reason: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub duration: Duration,
}

impl SuccessOutcome {
    pub fn token_count(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone)]
pub struct FailureOutcome {
    pub category: ErrorCategory,
    pub message: String,
    pub retriable: bool,
    pub duration: Duration,
}

/// An outcome tagged with the model name it belongs to.
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub model: String,
    pub outcome: Outcome,
}

/// The full result of one orchestrator run: per-model outcomes in the same
/// order as the input model list, plus an optional synthesis outcome.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub per_model: Vec<ModelOutcome>,
    pub synthesis: Option<ModelOutcome>,
}

impl RunResult {
    pub fn successes(&self) -> Vec<&ModelOutcome> {
        self.per_model.iter().filter(|m| m.outcome.is_success()).collect()
    }

    pub fn failures(&self) -> Vec<&ModelOutcome> {
        self.per_model.iter().filter(|m| !m.outcome.is_success()).collect()
    }
}

/// Materialize a `HashMap<model, outcome>` filled by worker tasks back into
/// the input model order. Worker completion order is not a sequencing
/// guarantee; only the input order is. A model missing from `by_model`
/// (the fan-in should never drop one, but a crash in an earlier stage is
/// cheaper to survive than to rule out by construction) becomes a
/// synthesized failure rather than a panic, preserving the one-outcome-per-
/// model invariant even in that case.
pub fn order_outcomes(models: &[String], mut by_model: HashMap<String, Outcome>) -> Vec<ModelOutcome> {
    models
        .iter()
        .map(|model| {
            let outcome = by_model.remove(model).unwrap_or_else(|| {
                Outcome::Failure(FailureOutcome {
                    category: ErrorCategory::Server,
                    message: "model processor produced no outcome".to_string(),
                    retriable: false,
                    duration: Duration::default(),
                })
            });
            ModelOutcome {
                model: model.clone(),
                outcome,
            }
        })
        .collect()
}

/// Additive end-of-run metrics, written to `run-summary.json` alongside the
/// per-model and synthesis files. Not part of the core file contract: its
/// absence or presence never changes the return value of a run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub correlation_id: String,
    pub model_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub synthesis_attempted: bool,
    pub synthesis_succeeded: bool,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_duration_ms: u128,
}

impl RunSummary {
    pub fn from_result(correlation_id: &str, result: &RunResult, wall_clock: Duration) -> Self {
        let mut total_prompt_tokens = 0u64;
        let mut total_completion_tokens = 0u64;
        let mut success_count = 0usize;
        let mut failure_count = 0usize;

        for m in &result.per_model {
            match &m.outcome {
                Outcome::Success(s) => {
                    success_count += 1;
                    total_prompt_tokens += s.prompt_tokens;
                    total_completion_tokens += s.completion_tokens;
                }
                Outcome::Failure(_) => failure_count += 1,
            }
        }

        let (synthesis_attempted, synthesis_succeeded) = match &result.synthesis {
            Some(m) => (true, m.outcome.is_success()),
            None => (false, false),
        };

        Self {
            correlation_id: correlation_id.to_string(),
            model_count: result.per_model.len(),
            success_count,
            failure_count,
            synthesis_attempted,
            synthesis_succeeded,
            total_prompt_tokens,
            total_completion_tokens,
            total_duration_ms: wall_clock.as_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(content: &str) -> Outcome {
        Outcome::Success(SuccessOutcome {
            content: content.to_string(),
            finish_reason: "stop".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
            duration: Duration::from_millis(1),
        })
    }

    #[test]
    fn order_outcomes_preserves_input_order_regardless_of_map_order() {
        let models = vec!["m3".to_string(), "m1".to_string(), "m2".to_string()];
        let mut map = HashMap::new();
        map.insert("m1".to_string(), success("one"));
        map.insert("m2".to_string(), success("two"));
        map.insert("m3".to_string(), success("three"));

        let ordered = order_outcomes(&models, map);
        let names: Vec<&str> = ordered.iter().map(|m| m.model.as_str()).collect();
        assert_eq!(names, vec!["m3", "m1", "m2"]);
    }

    #[test]
    fn order_outcomes_converts_a_missing_model_into_a_failure_instead_of_panicking() {
        let models = vec!["m1".to_string(), "m2".to_string()];
        let mut map = HashMap::new();
        map.insert("m1".to_string(), success("one"));
        // m2 is absent, as if its task had panicked and been dropped upstream.

        let ordered = order_outcomes(&models, map);
        assert_eq!(ordered.len(), 2);
        match &ordered[1].outcome {
            Outcome::Failure(f) => assert_eq!(f.category, ErrorCategory::Server),
            Outcome::Success(_) => panic!("expected a synthesized failure for the missing model"),
        }
    }

    #[test]
    fn run_summary_counts_successes_and_failures() {
        let result = RunResult {
            per_model: vec![
                ModelOutcome {
                    model: "m1".to_string(),
                    outcome: success("ok"),
                },
                ModelOutcome {
                    model: "m2".to_string(),
                    outcome: Outcome::Failure(FailureOutcome {
                        category: ErrorCategory::Server,
                        message: "boom".to_string(),
                        retriable: true,
                        duration: Duration::from_millis(2),
                    }),
                },
            ],
            synthesis: None,
        };

        let summary = RunSummary::from_result("abc", &result, Duration::from_millis(10));
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failure_count, 1);
        assert!(!summary.synthesis_attempted);
    }
}
