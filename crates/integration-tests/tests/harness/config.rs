//! Configuration builder for integration tests
//!
//! Renders TOML so every test goes through the same loading and validation
//! path as the binary.

use std::fmt::Write;

use weft_config::Config;
use weft_llm::LlmState;

/// Builder for test configurations
#[derive(Default)]
pub struct ConfigBuilder {
    toml: String,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an Anthropic provider pointed at a mock backend
    pub fn with_anthropic(mut self, name: &str, base_url: &str) -> Self {
        let _ = write!(
            self.toml,
            "\n[llm.providers.{name}]\ntype = \"anthropic\"\napi_key = \"sk-ant-test\"\nbase_url = \"{base_url}/v1\"\n"
        );
        self
    }

    /// Add a Google AI provider pointed at a mock backend
    pub fn with_google_ai(mut self, name: &str, base_url: &str) -> Self {
        let _ = write!(
            self.toml,
            "\n[llm.providers.{name}]\ntype = \"google_ai\"\napi_key = \"g-test\"\nbase_url = \"{base_url}/v1beta\"\n"
        );
        self
    }

    /// Add a Vertex AI provider pointed at a mock backend
    pub fn with_vertex(mut self, name: &str, base_url: &str, project: &str, location: &str) -> Self {
        let _ = write!(
            self.toml,
            "\n[llm.providers.{name}]\napi_key = \"ya29.token\"\nbase_url = \"{base_url}/v1\"\n\n\
             [llm.providers.{name}.type.vertex_ai]\nproject = \"{project}\"\nlocation = \"{location}\"\n"
        );
        self
    }

    /// Cap remote media downloads
    pub fn with_max_download_bytes(mut self, bytes: u64) -> Self {
        let _ = write!(self.toml, "\n[llm.media]\nmax_download_bytes = {bytes}\n");
        self
    }

    pub fn build(self) -> Config {
        Config::parse(&self.toml).expect("test config must be valid")
    }

    /// Build the provider registry
    pub fn state(self) -> LlmState {
        let config = self.build();
        LlmState::from_config(&config.llm).expect("providers must initialize")
    }
}
