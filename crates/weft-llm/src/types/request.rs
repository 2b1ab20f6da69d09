use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};
use crate::convert::anthropic::AnthropicConfig;
use crate::convert::google::GoogleConfig;

/// A provider-neutral generate request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Conversation, earliest first
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Desired structured output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
    /// Provider configuration in any accepted shape
    #[serde(default)]
    pub config: RequestConfig,
    /// Number of candidates to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<u32>,
}

impl GenerateRequest {
    /// Request with only messages set
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Whether the caller asked for JSON (constrained or not)
    pub fn wants_json(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|output| output.constrained || output.format.as_deref() == Some("json"))
    }
}

/// Structured output description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// `json`, `text`, `enum`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// JSON Schema the output must follow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Ask the provider to enforce the schema
    #[serde(default)]
    pub constrained: bool,
}

/// Generation parameters understood by every provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationCommonConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

/// The config attached to a request
///
/// Providers turn this into their own typed config through a single
/// coercion function (`AnthropicConfig::coerce`, `GoogleConfig::coerce`).
/// A JSON-decoded request always carries [`RequestConfig::Raw`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestConfig {
    #[default]
    Unset,
    Common(GenerationCommonConfig),
    Anthropic(Box<AnthropicConfig>),
    Google(Box<GoogleConfig>),
    /// String-keyed map, as decoded from JSON
    Raw(Value),
}

impl RequestConfig {
    /// Name of the variant, used in config errors
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Common(_) => "common generation config",
            Self::Anthropic(_) => "Anthropic config",
            Self::Google(_) => "Google config",
            Self::Raw(_) => "raw map",
        }
    }
}

impl From<GenerationCommonConfig> for RequestConfig {
    fn from(config: GenerationCommonConfig) -> Self {
        Self::Common(config)
    }
}

impl From<AnthropicConfig> for RequestConfig {
    fn from(config: AnthropicConfig) -> Self {
        Self::Anthropic(Box::new(config))
    }
}

impl From<GoogleConfig> for RequestConfig {
    fn from(config: GoogleConfig) -> Self {
        Self::Google(Box::new(config))
    }
}

impl From<Value> for RequestConfig {
    fn from(value: Value) -> Self {
        if value.is_null() { Self::Unset } else { Self::Raw(value) }
    }
}

impl Serialize for RequestConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            Self::Common(config) => config.serialize(serializer),
            Self::Anthropic(config) => config.serialize(serializer),
            Self::Google(config) => config.serialize(serializer),
            Self::Raw(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RequestConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Value::deserialize(deserializer)?.into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decoded_config_is_raw() {
        let request: GenerateRequest = serde_json::from_value(json!({
            "messages": [{"role": "user", "content": [{"text": "hi"}]}],
            "config": {"temperature": 0.5}
        }))
        .unwrap();
        assert_eq!(request.config, RequestConfig::Raw(json!({"temperature": 0.5})));
        assert_eq!(request.messages[0].text(), "hi");
    }

    #[test]
    fn null_config_is_unset() {
        let request: GenerateRequest = serde_json::from_value(json!({"messages": [], "config": null})).unwrap();
        assert_eq!(request.config, RequestConfig::Unset);
    }

    #[test]
    fn wants_json_for_constrained_or_json_format() {
        let mut request = GenerateRequest::default();
        assert!(!request.wants_json());

        request.output = Some(OutputSpec {
            format: Some("json".to_owned()),
            ..OutputSpec::default()
        });
        assert!(request.wants_json());

        request.output = Some(OutputSpec {
            constrained: true,
            ..OutputSpec::default()
        });
        assert!(request.wants_json());
    }
}
