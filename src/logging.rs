//! # Structured Logging Module
//!
//! Environment-aware structured logging for the database lifecycle.
//! `RUST_LOG` wins when set; otherwise `LOG_LEVEL` picks the level. Set
//! `LOG_FORMAT=json` for machine-readable output.

use chrono::Utc;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let level = get_log_level(std::env::var("LOG_LEVEL").ok().as_deref());
        let json = std::env::var("LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter())
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            level = %level,
            json,
            "Structured logging initialized"
        );
    });
}

/// Map `LOG_LEVEL` onto a tracing filter directive.
fn get_log_level(raw: Option<&str>) -> &'static str {
    match raw.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") | Some("critical") => "error",
        _ => "info",
    }
}

/// Log structured data for schema and migration operations
pub fn log_schema_operation(
    operation: &str,
    target: &str,
    status: &str,
    duration: Duration,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        target_db = %target,
        status = %status,
        duration_ms = duration.as_millis() as u64,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "SCHEMA_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
