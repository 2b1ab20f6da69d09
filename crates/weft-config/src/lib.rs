#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use telemetry::{LogFormat, TelemetryConfig};

/// Top-level weft configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
