//! Logging setup for weft
//!
//! Installs a `tracing-subscriber` registry with an env filter and a text or
//! JSON formatting layer.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use weft_config::{LogFormat, TelemetryConfig};

/// Initialize the global subscriber
///
/// Filter precedence is `RUST_LOG`, then the configured filter, then
/// `default_filter`. An unparseable directive falls back to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed
pub fn init(config: &TelemetryConfig, default_filter: &str) -> anyhow::Result<()> {
    let filter = build_filter(config, default_filter);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

fn build_filter(config: &TelemetryConfig, default_filter: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = config.filter.as_deref().unwrap_or(default_filter);
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"))
}
