//! Logging setup
//!
//! All log output goes to stderr so `--json` reports on stdout stay parseable.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line logs
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Install the global subscriber. Later calls are no-ops.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Span wrapping one command invocation
#[must_use]
pub fn run_span(command: &str, schema: &str) -> Span {
    tracing::info_span!("run", command = command, schema = schema)
}
