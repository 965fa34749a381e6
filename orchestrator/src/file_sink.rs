//! C4: File Sink.
//!
//! Writes atomically: a direct `fs::write` can leave a truncated file
//! behind if the process is killed mid-write, which would violate the
//! invariant that a file's existence implies that model's call succeeded.

use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, thiserror::Error)]
pub enum FileSinkError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename { from: PathBuf, to: PathBuf, source: std::io::Error },
}

pub struct FileSink {
    output_dir: PathBuf,
    correlation_id: String,
}

impl FileSink {
    pub fn new(output_dir: PathBuf, correlation_id: String) -> Self {
        Self { output_dir, correlation_id }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `content` to `<output_dir>/<filename>` atomically: write to a
    /// sibling temp file tagged with this run's correlation id, then
    /// rename onto the final path. A reader can never observe a partially
    /// written file under this name.
    pub async fn save(&self, filename: &str, content: &str) -> Result<PathBuf, FileSinkError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| FileSinkError::CreateDir {
                path: self.output_dir.clone(),
                source,
            })?;

        let final_path = self.output_dir.join(filename);
        let tmp_path = self.output_dir.join(format!("{filename}.tmp-{}", self.correlation_id));

        fs::write(&tmp_path, content).await.map_err(|source| FileSinkError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        fs::rename(&tmp_path, &final_path).await.map_err(|source| FileSinkError::Rename {
            from: tmp_path.clone(),
            to: final_path.clone(),
            source,
        })?;

        Ok(final_path)
    }
}
