//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem, plus a few
//! domain helpers so chunk and run events carry the same field names
//! everywhere.
//!
//! Errors from background runs are only observable here: the trigger caller
//! never sees them.

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging
///
/// Safe to call more than once and safe to call when another global
/// subscriber has already been installed (for example by a test harness).
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .with_filter(filter);

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SWEEP_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a committed or failed chunk write
pub fn log_chunk_operation(
    run_id: Uuid,
    chunk_index: usize,
    record_count: usize,
    status: &str,
    duration: Duration,
    details: Option<&str>,
) {
    tracing::info!(
        run_id = %run_id,
        chunk_index = chunk_index,
        record_count = record_count,
        status = %status,
        duration_ms = duration.as_millis() as u64,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CHUNK_OPERATION"
    );
}

/// Log the terminal state of a processor run
pub fn log_run_outcome(
    run_id: Uuid,
    status: &str,
    records_committed: u64,
    chunks_committed: u64,
    error: Option<&str>,
) {
    if let Some(error) = error {
        tracing::error!(
            run_id = %run_id,
            status = %status,
            records_committed = records_committed,
            chunks_committed = chunks_committed,
            error = %error,
            timestamp = %Utc::now().to_rfc3339(),
            "RUN_OUTCOME"
        );
    } else {
        tracing::info!(
            run_id = %run_id,
            status = %status,
            records_committed = records_committed,
            chunks_committed = chunks_committed,
            timestamp = %Utc::now().to_rfc3339(),
            "RUN_OUTCOME"
        );
    }
}
