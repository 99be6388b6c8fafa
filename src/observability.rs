//! Logging setup and span helpers.
//!
//! All engine paths log through `tracing` with `ticket_id` / `flow_id` fields;
//! this module installs the subscriber and builds the shared spans.

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; later calls are no-ops. `RUST_LOG` controls
/// levels (e.g. `info`, `dbm_ticket_flow::scheduler=debug`). Logs go to
/// stderr so stdout stays free for RPC responses.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
        };
        if let Err(err) = result {
            eprintln!("logging already initialized: {}", err);
        }
    });
}

/// Span for one scheduling pass over a ticket.
#[must_use]
pub fn ticket_span(operation: &str, ticket_id: u64) -> Span {
    tracing::info_span!("ticket", op = operation, ticket_id = ticket_id)
}

/// Span for one reconciler sweep.
#[must_use]
pub fn sweep_span(sweep: &str) -> Span {
    tracing::info_span!("reconcile", sweep = sweep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn test_ticket_span_enters() {
        let span = ticket_span("run_next_flow", 7);
        let _guard = span.enter();
        tracing::info!("inside ticket span");
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
