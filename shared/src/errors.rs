//! Shared error taxonomy for the fan-out orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("protocol error: {message}")]
    ProtocolError { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;

/// The error categories a model's outcome (or a fatal run error) is
/// classified into. Shared between the API service, the model processor,
/// and the orchestrator's aggregate-error reporting so all three agree on
/// one vocabulary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Missing or rejected credentials. Never retried.
    #[error("authentication failed")]
    Auth,
    /// Provider-side 429 or a local quota hit.
    #[error("rate limited")]
    RateLimit,
    /// Prompt exceeds the model's context window.
    #[error("input exceeds model context window")]
    InputLimit,
    /// Safety/moderation block.
    #[error("content filtered")]
    ContentFiltered,
    /// Provider returned no content.
    #[error("empty response")]
    EmptyResponse,
    /// Context cancelled or deadline exceeded.
    #[error("cancelled")]
    Cancelled,
    /// Upstream 5xx or transport error.
    #[error("server error")]
    Server,
    /// Local file or network error outside the provider call itself.
    #[error("io error")]
    Io,
    /// Validation error, unknown model, or duplicate sanitized names.
    #[error("invalid request")]
    InvalidRequest,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Auth",
            ErrorCategory::RateLimit => "RateLimit",
            ErrorCategory::InputLimit => "InputLimit",
            ErrorCategory::ContentFiltered => "ContentFiltered",
            ErrorCategory::EmptyResponse => "EmptyResponse",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::Server => "Server",
            ErrorCategory::Io => "IO",
            ErrorCategory::InvalidRequest => "InvalidRequest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_match_spec_vocabulary() {
        assert_eq!(ErrorCategory::Io.as_str(), "IO");
        assert_eq!(ErrorCategory::InvalidRequest.as_str(), "InvalidRequest");
    }
}
