use serde::Deserialize;

/// Logging configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// `tracing` filter directive (e.g. `info,weft_llm=debug`)
    ///
    /// `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub filter: Option<String>,
    /// Output format for log lines
    #[serde(default)]
    pub format: LogFormat,
}

/// Output format for log lines
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}
