use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::convert::decode_raw_config;
use crate::error::LlmError;
use crate::protocol::google::GoogleThinkingConfig;
use crate::types::{GenerationCommonConfig, RequestConfig};

/// Typed Google GenAI request config
///
/// Keys are camelCase, matching `generateContent`. Native fields that have a
/// canonical counterpart (`systemInstruction`, function declarations in
/// `tools`, `responseSchema`, `candidateCount`) are exclusive with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    /// Native response schema, already in the Gemini dialect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Value>,
    /// Native tools (`googleSearch`, `codeExecution`, `urlContext`, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<IndexMap<String, String>>,
    /// Passthrough fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GoogleConfig {
    /// Normalize any accepted config shape into a `GoogleConfig`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` for another provider's typed config or a
    /// raw value that is not a decodable JSON object.
    pub fn coerce(config: &RequestConfig) -> Result<Self, LlmError> {
        match config {
            RequestConfig::Unset => Ok(Self::default()),
            RequestConfig::Google(config) => Ok((**config).clone()),
            RequestConfig::Common(common) => Ok(common.into()),
            RequestConfig::Raw(value) => decode_raw_config(value, "Google"),
            other @ RequestConfig::Anthropic(_) => Err(LlmError::Config(format!(
                "unexpected config type for Google: {}",
                other.variant_name()
            ))),
        }
    }

    /// Whether native tools declare client-side functions
    pub fn has_function_declarations(&self) -> bool {
        self.tools
            .iter()
            .any(|tool| tool.get("functionDeclarations").is_some())
    }
}

impl From<&GenerationCommonConfig> for GoogleConfig {
    fn from(common: &GenerationCommonConfig) -> Self {
        Self {
            temperature: common.temperature,
            top_p: common.top_p,
            top_k: common.top_k,
            max_output_tokens: common.max_output_tokens,
            stop_sequences: common.stop_sequences.clone(),
            ..Self::default()
        }
    }
}
