//! Google GenAI (`generateContent`) wire format types
//!
//! Shared by the Google AI and Vertex AI backends.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// -- Request types --

/// Google `generateContent` request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    /// Conversation contents
    pub contents: Vec<GoogleContent>,
    /// System instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
    /// Generation configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,
    /// Tool configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GoogleToolConfig>,
    /// Safety thresholds, forwarded verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Vec<Value>>,
    /// Name of a cached content resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,
    /// Billing labels (Vertex AI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<IndexMap<String, String>>,
    /// Passthrough fields from raw config
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Google content object containing role and parts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoogleContent {
    /// Role ("user" or "model")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<GooglePart>,
}

/// Individual part within a Google content object
///
/// The API models a part as a union but encodes it as an object with
/// optional fields; exactly one payload field is expected to be set.
/// Fields this version does not know land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Marks `text` as a thought summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Opaque signature to echo back on the next turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GoogleBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<GoogleFileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GoogleFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GoogleFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_code: Option<GoogleExecutableCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_execution_result: Option<GoogleCodeExecutionResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GooglePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Number of payload fields set
    ///
    /// Unknown fields count as one payload only when no known payload is
    /// set; next to a known payload they are treated as annotations.
    pub fn payload_count(&self) -> usize {
        let known = [
            self.text.is_some(),
            self.inline_data.is_some(),
            self.file_data.is_some(),
            self.function_call.is_some(),
            self.function_response.is_some(),
            self.executable_code.is_some(),
            self.code_execution_result.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        if known == 0 && !self.extra.is_empty() {
            1
        } else {
            known
        }
    }

    /// Whether this is a text part (thought or answer)
    pub const fn is_text(&self) -> bool {
        self.text.is_some()
            && self.inline_data.is_none()
            && self.file_data.is_none()
            && self.function_call.is_none()
            && self.function_response.is_none()
            && self.executable_code.is_none()
            && self.code_execution_result.is_none()
    }

    pub fn is_thought(&self) -> bool {
        self.thought == Some(true)
    }
}

/// Inline binary data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleBlob {
    /// MIME type (e.g. "image/png")
    pub mime_type: String,
    /// Base64-encoded data
    pub data: String,
}

/// Reference to data the API fetches itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub file_uri: String,
}

/// Function call from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionCall {
    /// Call identifier, when the model assigns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Function arguments as JSON
    #[serde(default)]
    pub args: Value,
}

/// Function response from the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    /// Id of the call being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Response content as a JSON object
    #[serde(default)]
    pub response: Value,
    /// Multimodal result parts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<GooglePart>,
}

/// Code generated for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleExecutableCode {
    /// Language, e.g. "PYTHON"
    pub language: String,
    pub code: String,
}

/// Outcome of code execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCodeExecutionResult {
    /// "OUTCOME_OK", "OUTCOME_FAILED", ...
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Generation configuration parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Candidate count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Output MIME type ("application/json", "text/x.enum")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    /// Output schema in the Gemini dialect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<GoogleSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,
    /// Generation fields without a typed counterpart (`mediaResolution`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Thinking controls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleThinkingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,
    /// "LOW" or "HIGH" on models that take a level instead of a budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
}

/// Schema type in the Gemini dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoogleSchemaType {
    #[serde(alias = "string")]
    String,
    #[serde(alias = "number")]
    Number,
    #[serde(alias = "integer")]
    Integer,
    #[serde(alias = "boolean")]
    Boolean,
    #[serde(alias = "object")]
    Object,
    #[serde(alias = "array")]
    Array,
}

/// OpenAPI-subset schema accepted by `responseSchema` and function parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<GoogleSchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<GoogleSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, GoogleSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_ordering: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Google tool definition
///
/// One entry may carry function declarations or a native tool
/// (`googleSearch`, `codeExecution`, `urlContext`, ...) in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    /// Function declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<GoogleFunctionDeclaration>>,
    /// Native tool toggles
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Google function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleFunctionDeclaration {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Parameter schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GoogleSchema>,
}

/// Google tool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleToolConfig {
    /// Function calling config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_calling_config: Option<GoogleFunctionCallingConfig>,
    /// Retrieval settings and other native fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Function calling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFunctionCallingConfig {
    /// Mode: "AUTO", "ANY", "NONE"
    pub mode: String,
    /// Allowed function names (when mode is "ANY")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

// -- Response types --

/// Google `generateContent` response; also one streamed chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    /// Token usage metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GoogleUsageMetadata>,
    /// Set when the prompt itself was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<GooglePromptFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

/// Generated candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    /// Generated content; missing when the candidate was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GoogleContent>,
    /// Finish reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Explanation accompanying some finish reasons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_message: Option<String>,
    /// Candidate index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
}

/// Prompt-level feedback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePromptFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratings: Option<Vec<Value>>,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    /// Prompt token count
    #[serde(default)]
    pub prompt_token_count: u64,
    /// Candidates token count
    #[serde(default)]
    pub candidates_token_count: u64,
    /// Total token count
    #[serde(default)]
    pub total_token_count: u64,
    /// Prompt tokens served from cached content
    #[serde(default)]
    pub cached_content_token_count: u64,
    /// Tokens spent thinking
    #[serde(default)]
    pub thoughts_token_count: u64,
}

// -- Error types --

/// Google API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleErrorResponse {
    /// Error details
    pub error: GoogleErrorDetail,
}

/// Google API error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleErrorDetail {
    /// HTTP status code
    #[serde(default)]
    pub code: u16,
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Status string (e.g. `INVALID_ARGUMENT`)
    #[serde(default)]
    pub status: String,
}
