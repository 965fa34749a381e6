//! Binary entry point: parses flags, loads configuration, wires the
//! concrete services together, runs the orchestrator, and maps the result
//! onto a process exit code.

use clap::Parser;
use orchestrator::cli::Args;
use orchestrator::config::{ConfigFile, RunConfig};
use orchestrator::providers::HttpApiService;
use orchestrator::{ModelOutcome, Orchestrator, Outcome, OrchestratorError};
use shared::{correlation_error, correlation_info, logging};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config_file = match &args.config {
        Some(path) => match ConfigFile::load(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("failed to load config file: {err}");
                return ExitCode::from(4);
            }
        },
        None => None,
    };

    let run_config = match RunConfig::resolve(&args, config_file) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("invalid configuration: {message}");
            return ExitCode::from(4);
        }
    };

    logging::init_tracing(&run_config.log_level);

    let api_service = Arc::new(HttpApiService::from_env());

    let orchestrator = match Orchestrator::new(&run_config, api_service).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("failed to initialize orchestrator: {err}");
            return ExitCode::from(1);
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    let correlation_id = orchestrator.correlation_id().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            correlation_info!(correlation_id, "received Ctrl+C, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    match orchestrator.execute(&run_config, cancel).await {
        Ok(result) => {
            print_summary(&result.per_model, result.synthesis.as_ref());
            ExitCode::from(0)
        }
        Err(err) => {
            correlation_error!(orchestrator.correlation_id(), "run failed: {}", err);
            report_failure(&err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn print_summary(per_model: &[ModelOutcome], synthesis: Option<&ModelOutcome>) {
    for outcome in per_model {
        match &outcome.outcome {
            Outcome::Success(_) => println!("{}: success", outcome.model),
            Outcome::Failure(f) => eprintln!("{}: failed [{}]: {}", outcome.model, f.category.as_str(), f.message),
        }
    }
    if let Some(synth) = synthesis {
        match &synth.outcome {
            Outcome::Success(_) => println!("{} (synthesis): success", synth.model),
            Outcome::Failure(f) => eprintln!("{} (synthesis): failed [{}]: {}", synth.model, f.category.as_str(), f.message),
        }
    }
}

fn report_failure(err: &OrchestratorError) {
    match err {
        OrchestratorError::AllModelsFailed(failures) | OrchestratorError::PartialFailure(failures) => {
            for failure in &failures.0 {
                eprintln!("{}: failed [{}]: {}", failure.model, failure.category.as_str(), failure.message);
            }
        }
        other => eprintln!("{other}"),
    }
}
