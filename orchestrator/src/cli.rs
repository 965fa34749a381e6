//! Command-line argument definition: one flat `clap::Parser` struct with
//! `Option<T>` fields for everything a config file could also supply.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(about = "Fans a prompt out to multiple LLM providers concurrently and optionally synthesizes their responses")]
pub struct Args {
    /// Path to the instruction document.
    #[arg(long)]
    pub instructions: Option<PathBuf>,

    /// Path to a TOML config file supplying any run setting this command
    /// does not override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output directory for per-model files, the synthesis file (if any),
    /// and the run summary.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Model to fan the prompt out to. Repeat for multiple models.
    #[arg(long = "model")]
    pub models: Vec<String>,

    /// Model that combines all successful responses into one artifact.
    #[arg(long)]
    pub synthesis_model: Option<String>,

    /// Glob pattern for files to include in context. Repeat for multiple
    /// patterns; if none are given, every file under `--root` is included.
    #[arg(long)]
    pub include: Vec<String>,

    /// Glob pattern for files to exclude from context.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Root path to walk for context files. Repeat for multiple roots.
    #[arg(long = "root")]
    pub roots: Vec<PathBuf>,

    /// Maximum number of in-flight provider requests. 0 means unlimited.
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Global requests-per-minute ceiling shared by every provider without
    /// its own configured rate. 0 means unlimited.
    #[arg(long)]
    pub global_rpm: Option<u32>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to the append-only audit log. Defaults to `<output>/audit.jsonl`.
    #[arg(long)]
    pub audit_log: Option<PathBuf>,

    /// Override the generated correlation ID (primarily for reproducing a
    /// prior run's logs).
    #[arg(long)]
    pub correlation_id: Option<String>,

    /// Maximum output tokens requested per model call.
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature, 0.0 to 1.0.
    #[arg(long)]
    pub temperature: Option<f32>,
}
