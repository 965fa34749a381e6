//! Core orchestration library: fans one prompt out to multiple LLM
//! providers concurrently, persists per-model responses, and optionally
//! runs a synthesis pass over the successful ones.

pub mod api_service;
pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod file_sink;
pub mod orchestrator;
pub mod outcome;
pub mod processor;
pub mod prompt;
pub mod providers;
pub mod rate_limiter;
pub mod sanitize;

pub use error::{ModelFailure, ModelFailures, OrchestratorError, OrchestratorResult};
pub use orchestrator::Orchestrator;
pub use outcome::{FailureOutcome, ModelOutcome, Outcome, RunResult, RunSummary, SuccessOutcome};
