//! Error taxonomy for the orchestrator core.
//!
//! A per-model failure never aborts the run by itself: it is collected
//! into a [`ModelFailure`] and surfaced as part of either
//! [`OrchestratorError::PartialFailure`] or [`OrchestratorError::AllModelsFailed`].
//! Only validation, cancellation, and I/O failures on the instructions file
//! or audit log setup are fatal on their own.

use shared::ErrorCategory;
use std::fmt;
use thiserror::Error;

/// One model's classified failure, attached to its model name.
#[derive(Debug, Clone)]
pub struct ModelFailure {
    pub model: String,
    pub category: ErrorCategory,
    pub message: String,
}

impl fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.model, self.category.as_str(), self.message)
    }
}

/// A non-empty list of model failures, rendered as a comma-separated
/// summary in error messages.
#[derive(Debug, Clone)]
pub struct ModelFailures(pub Vec<ModelFailure>);

impl fmt::Display for ModelFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ModelFailure::to_string).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Validation failure before any API call: empty model list, duplicate
    /// sanitized filenames, unknown synthesis model, unreadable instructions.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The run's context was cancelled (deadline exceeded or explicit
    /// cancellation) before it completed.
    #[error("run cancelled")]
    Cancelled,

    /// Every configured model failed; no output files were written.
    #[error("all models failed: {0}")]
    AllModelsFailed(ModelFailures),

    /// At least one model succeeded and at least one failed, or synthesis
    /// was configured and failed while every individual model succeeded.
    #[error("partial failure: {0}")]
    PartialFailure(ModelFailures),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl OrchestratorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Maps each variant onto a process exit code: 1 generic failure, 2
    /// partial failure, 4 invalid request, 5 cancelled (0 success is not
    /// represented here since success carries no error).
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::InvalidRequest { .. } => 4,
            OrchestratorError::Cancelled => 5,
            OrchestratorError::PartialFailure(_) => 2,
            OrchestratorError::AllModelsFailed(_) => 1,
            OrchestratorError::Io(_) | OrchestratorError::Json(_) | OrchestratorError::Configuration { .. } => 1,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
