//! Layered configuration: CLI flags > environment variables > TOML config
//! file > built-in defaults.

use crate::cli::Args;
use shared::ProviderId;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// The on-disk shape of a TOML config file. Every field is optional so a
/// file can override only the settings it cares about; CLI flags still win
/// over whatever the file sets.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ConfigFile {
    pub instructions: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub models: Option<Vec<String>>,
    pub synthesis_model: Option<String>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub roots: Option<Vec<PathBuf>>,
    pub concurrency: Option<u32>,
    pub global_rpm: Option<u32>,
    pub per_provider_rpm: Option<HashMap<String, u32>>,
    pub log_level: Option<String>,
    pub audit_log: Option<PathBuf>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ConfigFile {
    pub fn load(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.clone(), source })
    }
}

/// The fully resolved run configuration, immutable for the duration of one
/// run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub instructions: PathBuf,
    pub output_dir: PathBuf,
    pub models: Vec<String>,
    pub synthesis_model: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub roots: Vec<PathBuf>,
    pub concurrency: u32,
    pub global_rpm: u32,
    pub per_provider_rpm: HashMap<ProviderId, u32>,
    pub log_level: String,
    pub audit_log: PathBuf,
    pub correlation_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

fn parse_provider_rpm_map(map: HashMap<String, u32>) -> HashMap<ProviderId, u32> {
    map.into_iter()
        .filter_map(|(name, rpm)| parse_provider_name(&name).map(|p| (p, rpm)))
        .collect()
}

fn parse_provider_name(name: &str) -> Option<ProviderId> {
    match name.to_lowercase().as_str() {
        "openai" => Some(ProviderId::OpenAi),
        "anthropic" => Some(ProviderId::Anthropic),
        "gemini" => Some(ProviderId::Gemini),
        "openrouter" => Some(ProviderId::OpenRouter),
        _ => None,
    }
}

impl RunConfig {
    /// Merge CLI flags over an optional config file over built-in
    /// defaults. CLI flags always win when present; a config file value
    /// wins over the default only when the flag was not supplied.
    pub fn resolve(args: &Args, file: Option<ConfigFile>) -> Result<Self, String> {
        let file = file.unwrap_or_default();

        let instructions = args
            .instructions
            .clone()
            .or(file.instructions)
            .ok_or_else(|| "instructions path is required (--instructions or config file)".to_string())?;

        let models = if !args.models.is_empty() {
            args.models.clone()
        } else {
            file.models.unwrap_or_default()
        };

        let output_dir = args.output.clone().or(file.output_dir).unwrap_or_else(|| PathBuf::from("./output"));

        let synthesis_model = args.synthesis_model.clone().or(file.synthesis_model);

        let include = if !args.include.is_empty() { args.include.clone() } else { file.include.unwrap_or_default() };
        let exclude = if !args.exclude.is_empty() { args.exclude.clone() } else { file.exclude.unwrap_or_default() };
        let roots = if !args.roots.is_empty() { args.roots.clone() } else { file.roots.unwrap_or_default() };

        let concurrency = args.concurrency.or(file.concurrency).unwrap_or(0);
        let global_rpm = args.global_rpm.or(file.global_rpm).unwrap_or(0);
        let per_provider_rpm = file.per_provider_rpm.map(parse_provider_rpm_map).unwrap_or_default();

        let log_level = args.log_level.clone().or(file.log_level).unwrap_or_else(|| "info".to_string());
        let audit_log = args.audit_log.clone().or(file.audit_log).unwrap_or_else(|| output_dir.join("audit.jsonl"));

        let max_tokens = args.max_tokens.or(file.max_tokens);
        let temperature = args.temperature.or(file.temperature);

        Ok(Self {
            instructions,
            output_dir,
            models,
            synthesis_model,
            include,
            exclude,
            roots,
            concurrency,
            global_rpm,
            per_provider_rpm,
            log_level,
            audit_log,
            correlation_id: args.correlation_id.clone(),
            max_tokens,
            temperature,
        })
    }
}
