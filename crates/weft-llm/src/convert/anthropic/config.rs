use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::convert::decode_raw_config;
use crate::error::LlmError;
use crate::types::{GenerationCommonConfig, RequestConfig};

/// Typed Anthropic request config
///
/// Keys are snake case, matching the Messages API; the common camelCase
/// spellings are accepted as aliases. Unknown keys are kept in `extra` and
/// forwarded to the API verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, alias = "maxOutputTokens", alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, alias = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, alias = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, alias = "stopSequences", skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Sent as `metadata.user_id`
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, alias = "serviceTier", skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    /// Extended thinking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Native system prompt; exclusive with system-role messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    /// Native tools (web search, bash, ...)
    ///
    /// An entry with an `input_schema` is a custom tool and is exclusive
    /// with canonical tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// Native output format; exclusive with constrained canonical output
    #[serde(default, alias = "outputFormat", skip_serializing_if = "Option::is_none")]
    pub output_format: Option<Value>,
    /// Passthrough fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extended thinking settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, alias = "budgetTokens", skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl AnthropicConfig {
    /// Normalize any accepted config shape into an `AnthropicConfig`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` for another provider's typed config or a
    /// raw value that is not a decodable JSON object.
    pub fn coerce(config: &RequestConfig) -> Result<Self, LlmError> {
        match config {
            RequestConfig::Unset => Ok(Self::default()),
            RequestConfig::Anthropic(config) => Ok((**config).clone()),
            RequestConfig::Common(common) => Ok(common.into()),
            RequestConfig::Raw(value) => decode_raw_config(value, "Anthropic"),
            other @ RequestConfig::Google(_) => Err(LlmError::Config(format!(
                "unexpected config type for Anthropic: {}",
                other.variant_name()
            ))),
        }
    }

    /// Whether the native tool list defines a client-side custom tool
    pub fn has_custom_tools(&self) -> bool {
        self.tools.iter().any(|tool| tool.get("input_schema").is_some())
    }
}

impl From<&GenerationCommonConfig> for AnthropicConfig {
    fn from(common: &GenerationCommonConfig) -> Self {
        Self {
            max_tokens: common.max_output_tokens,
            temperature: common.temperature,
            top_p: common.top_p,
            top_k: common.top_k,
            stop_sequences: common.stop_sequences.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::convert::google::GoogleConfig;

    #[test]
    fn raw_map_decodes_with_aliases_and_passthrough() {
        let config = AnthropicConfig::coerce(&RequestConfig::Raw(json!({
            "maxOutputTokens": 512,
            "temperature": 0.3,
            "user_id": "u-1",
            "thinking": {"enabled": true, "budgetTokens": 2048},
            "container": "ctr_1"
        })))
        .unwrap();

        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.user_id.as_deref(), Some("u-1"));
        assert_eq!(
            config.thinking,
            Some(ThinkingConfig {
                enabled: true,
                budget_tokens: Some(2048)
            })
        );
        assert_eq!(config.extra.get("container"), Some(&json!("ctr_1")));
    }

    #[test]
    fn typed_and_common_configs_coerce() {
        let typed = AnthropicConfig {
            top_k: Some(5),
            ..AnthropicConfig::default()
        };
        assert_eq!(AnthropicConfig::coerce(&typed.clone().into()).unwrap(), typed);

        let common = GenerationCommonConfig {
            max_output_tokens: Some(100),
            stop_sequences: vec!["END".to_owned()],
            ..GenerationCommonConfig::default()
        };
        let coerced = AnthropicConfig::coerce(&common.into()).unwrap();
        assert_eq!(coerced.max_tokens, Some(100));
        assert_eq!(coerced.stop_sequences, ["END"]);
    }

    #[test]
    fn foreign_typed_config_is_rejected() {
        let err = AnthropicConfig::coerce(&GoogleConfig::default().into()).unwrap_err();
        assert_eq!(err.to_string(), "invalid config: unexpected config type for Anthropic: Google config");
    }

    #[test]
    fn raw_scalar_is_rejected() {
        let err = AnthropicConfig::coerce(&RequestConfig::Raw(json!("fast"))).unwrap_err();
        assert!(matches!(err, LlmError::Config(ref msg) if msg.contains("got a string")));
    }

    #[test]
    fn custom_tool_detection() {
        let config = AnthropicConfig {
            tools: vec![json!({"type": "web_search_20250305", "name": "web_search"})],
            ..AnthropicConfig::default()
        };
        assert!(!config.has_custom_tools());

        let config = AnthropicConfig {
            tools: vec![json!({"name": "lookup", "input_schema": {"type": "object"}})],
            ..AnthropicConfig::default()
        };
        assert!(config.has_custom_tools());
    }
}
