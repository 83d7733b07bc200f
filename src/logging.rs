//! # Structured Logging
//!
//! `tracing` subscriber setup plus helpers for the handful of structured records
//! the deployer emits outside the code-keyed [`crate::events::EventLog`].

use crate::config::LoggingSettings;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber; later calls are no-ops.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_structured_logging(settings: &LoggingSettings) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
        };

        let layer = if settings.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(filter())
                .boxed()
        };

        // Another component may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            level = %settings.level,
            json = settings.json,
            "Structured logging initialized"
        );
    });
}

/// Log a top-level deployer operation
pub fn log_deployment_operation(
    operation: &str,
    identity: Option<&str>,
    location: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        identity = identity,
        location = location,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DEPLOYMENT_OPERATION"
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let settings = LoggingSettings::default();
        init_structured_logging(&settings);
        init_structured_logging(&settings);
        log_deployment_operation("install", Some("module:x:1.0.0"), None, "ok", None);
        log_error("deployer", "install", "boom", Some("test"));
    }
}
