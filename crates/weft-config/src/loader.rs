use std::path::Path;

use crate::{Config, ProviderType};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, a model filter is not
    /// a valid regex, a Vertex provider lacks its project or location, or
    /// the media download cap is zero
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        for (name, provider) in &self.llm.providers {
            if name.contains('/') {
                anyhow::bail!("provider name '{name}' must not contain '/'");
            }

            for pattern in provider.models.include.iter().chain(&provider.models.exclude) {
                regex::Regex::new(pattern)
                    .map_err(|e| anyhow::anyhow!("invalid model pattern for provider '{name}': {e}"))?;
            }

            if let ProviderType::VertexAi(vertex) = &provider.provider_type
                && (vertex.project.trim().is_empty() || vertex.location.trim().is_empty())
            {
                anyhow::bail!("vertex provider '{name}' requires both project and location");
            }
        }

        if self.llm.media.max_download_bytes == 0 {
            anyhow::bail!("llm.media.max_download_bytes must be greater than 0");
        }

        Ok(())
    }
}
