use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Default cap on a single remote media download (20 MiB)
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Top-level LLM configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider configurations keyed by name
    ///
    /// The key is the prefix used in `provider/model` names.
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Media resolution settings shared by all providers
    #[serde(default)]
    pub media: MediaConfig,
}

/// Configuration for a single provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider protocol type
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// API key (Anthropic, Google AI) or OAuth access token (Vertex AI)
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model name filters
    #[serde(default)]
    pub models: ModelConfig,
    /// `max_tokens` sent when the request does not set one
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
}

/// Supported provider protocols
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Anthropic Messages API
    Anthropic,
    /// Google AI (Generative Language API)
    GoogleAi,
    /// Google Cloud Vertex AI
    VertexAi(VertexConfig),
}

/// Vertex AI project settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertexConfig {
    /// Google Cloud project id
    pub project: String,
    /// Region (e.g. `us-central1`, or `global`)
    pub location: String,
}

/// Model name filters for a provider
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Only serve models matching one of these patterns (regex)
    #[serde(default)]
    pub include: Vec<String>,
    /// Never serve models matching one of these patterns (regex)
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Media download settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Maximum number of bytes accepted from a single remote media URL
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

const fn default_max_download_bytes() -> u64 {
    DEFAULT_MAX_DOWNLOAD_BYTES
}
