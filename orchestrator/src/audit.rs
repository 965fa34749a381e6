//! C5: Audit Logger.
//!
//! Append-only JSON-lines sink, one object per operation record. Grounded
//! on `shared::logging`'s correlation-tagged macro approach for what gets
//! logged, but the audit trail is a dedicated file rather than the tracing
//! subscriber's output, so a downstream tool can replay a run from the log
//! alone.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Recognized operation names the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ExecuteStart,
    ReadInstructions,
    GatherContextStart,
    GatherContextEnd,
    ModelProcessingStart,
    ModelProcessingEnd,
    SynthesisStart,
    SynthesisEnd,
    SaveOutputStart,
    SaveOutputEnd,
    ExecuteEnd,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::ExecuteStart => "ExecuteStart",
            Operation::ReadInstructions => "ReadInstructions",
            Operation::GatherContextStart => "GatherContextStart",
            Operation::GatherContextEnd => "GatherContextEnd",
            Operation::ModelProcessingStart => "ModelProcessingStart",
            Operation::ModelProcessingEnd => "ModelProcessingEnd",
            Operation::SynthesisStart => "SynthesisStart",
            Operation::SynthesisEnd => "SynthesisEnd",
            Operation::SaveOutputStart => "SaveOutputStart",
            Operation::SaveOutputEnd => "SaveOutputEnd",
            Operation::ExecuteEnd => "ExecuteEnd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    InProgress,
    Success,
    Failure,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::InProgress => "InProgress",
            Status::Success => "Success",
            Status::Failure => "Failure",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub error_type: String,
}

/// One audit record. `inputs`/`outputs` are free-form JSON objects; the
/// logger injects `correlation_id` into `inputs` if the caller left it out.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub operation: Operation,
    pub status: Status,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub error: Option<ErrorDetail>,
    pub message: Option<String>,
}

impl AuditEntry {
    pub fn new(operation: Operation, status: Status) -> Self {
        Self {
            operation,
            status,
            inputs: Value::Object(Default::default()),
            outputs: None,
            error: None,
            message: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Value) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.error = Some(ErrorDetail {
            message: message.into(),
            error_type: error_type.into(),
        });
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: String,
    operation: &'a str,
    status: &'a str,
    inputs: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: &'a Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<SerializedError<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: &'a Option<String>,
}

#[derive(Serialize)]
struct SerializedError<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    error_type: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to open audit log {path}: {source}")]
    Open { path: PathBuf, source: std::io::Error },

    #[error("failed to write audit log {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

pub struct AuditLogger {
    path: PathBuf,
    correlation_id: String,
    file: Mutex<Option<File>>,
}

impl AuditLogger {
    pub async fn open(path: impl AsRef<Path>, correlation_id: impl Into<String>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| AuditError::Open {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditError::Open { path: path.clone(), source })?;

        Ok(Self {
            path,
            correlation_id: correlation_id.into(),
            file: Mutex::new(Some(file)),
        })
    }

    /// Append one record, auto-injecting `correlation_id` into `inputs` if
    /// absent, and flushing so a crash mid-run leaves a valid prefix of
    /// complete JSON lines.
    pub async fn log(&self, mut entry: AuditEntry) -> Result<(), AuditError> {
        if let Value::Object(ref mut map) = entry.inputs {
            map.entry("correlation_id").or_insert_with(|| Value::String(self.correlation_id.clone()));
        }

        let line = AuditLine {
            timestamp: Utc::now().to_rfc3339(),
            operation: entry.operation.as_str(),
            status: entry.status.as_str(),
            inputs: &entry.inputs,
            outputs: &entry.outputs,
            error: entry.error.as_ref().map(|e| SerializedError {
                message: &e.message,
                error_type: &e.error_type,
            }),
            message: &entry.message,
        };

        let mut serialized = serde_json::to_string(&line).map_err(|source| AuditError::Write {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;
        serialized.push('\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().expect("audit logger used after close");
        file.write_all(serialized.as_bytes())
            .await
            .map_err(|source| AuditError::Write { path: self.path.clone(), source })?;
        file.flush().await.map_err(|source| AuditError::Write { path: self.path.clone(), source })?;
        Ok(())
    }

    /// Idempotent: a second call after the handle is already dropped is a
    /// no-op rather than an error.
    pub async fn close(&self) {
        let mut guard = self.file.lock().await;
        *guard = None;
    }
}
