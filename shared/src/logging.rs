//! `tracing` setup and correlation-aware logging macros.
//!
//! Every log line the orchestrator binary emits during a run carries the
//! run's correlation ID as a structured field, the same way the audit log
//! carries it in `inputs.correlation_id`.

use chrono::{DateTime, Utc};

/// Initialize the global tracing subscriber at the given log level
/// (`trace`, `debug`, `info`, `warn`, `error`). Safe to call once at process
/// start; a second call is a logic error in the caller, not handled here.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::new(format!("orchestrator={log_level},shared={log_level}"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Formatted timestamp used by the contextual logging helpers below.
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for correlation-aware info logging.
#[macro_export]
macro_rules! correlation_info {
    ($correlation_id:expr, $($arg:tt)*) => {
        tracing::info!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware warning logging.
#[macro_export]
macro_rules! correlation_warn {
    ($correlation_id:expr, $($arg:tt)*) => {
        tracing::warn!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware error logging.
#[macro_export]
macro_rules! correlation_error {
    ($correlation_id:expr, $($arg:tt)*) => {
        tracing::error!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware debug logging.
#[macro_export]
macro_rules! correlation_debug {
    ($correlation_id:expr, $($arg:tt)*) => {
        tracing::debug!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}
