//! Tracing and logging setup for the Telos CLI.
//!
//! Structured logging with environment-based level filtering and a choice
//! of human-readable or JSON output.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

/// Initialize the tracing subscriber.
///
/// * `json` - emit JSON log lines (for machine parsing) instead of the
///   pretty human format.
/// * `default_level` - level used when `RUST_LOG` is not set
///   ("error", "warn", "info", "debug", "trace").
pub fn setup_logging(json: bool, default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .init();
    }
}

/// Check if JSON logging is requested via environment variable.
pub fn should_use_json() -> bool {
    std::env::var("TELOS_LOG_JSON")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}
