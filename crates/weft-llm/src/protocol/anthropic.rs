//! Anthropic Messages API wire format types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// -- Request types --

/// Anthropic messages API request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate (required by Anthropic)
    pub max_tokens: u32,
    /// System prompt (top-level, not in messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<AnthropicSystem>,
    /// Conversation messages
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions, custom and server-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
    /// Request metadata (end-user id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnthropicMetadata>,
    /// `auto` or `standard_only`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    /// Extended thinking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<AnthropicThinking>,
    /// Structured output format (beta)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<Value>,
    /// Passthrough fields from raw config
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// System prompt, either plain text or blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicSystem {
    /// Plain text
    Text(String),
    /// Text blocks, which may carry cache control
    Blocks(Vec<AnthropicContentBlock>),
}

/// Anthropic message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role ("user" or "assistant")
    pub role: String,
    /// Content blocks
    pub content: Vec<AnthropicContentBlock>,
}

/// Content block in a request or response
///
/// Block types this crate does not know deserialize into
/// [`AnthropicContentBlock::Unknown`] with the raw JSON, so new provider
/// features never fail a whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    /// Text content
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<Value>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<AnthropicCacheControl>,
    },
    /// Image content
    Image {
        source: AnthropicSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<AnthropicCacheControl>,
    },
    /// PDF or plain-text document
    Document {
        source: AnthropicSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<AnthropicCacheControl>,
    },
    /// Tool use request from the assistant
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<AnthropicCacheControl>,
    },
    /// Tool result from the user
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<AnthropicToolResultContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<AnthropicCacheControl>,
    },
    /// Extended thinking output
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    /// Encrypted thinking
    RedactedThinking { data: String },
    /// Tool executed by Anthropic (web search, code execution, ...)
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Anything else, including `*_tool_result` server results
    #[serde(untagged)]
    Unknown(Value),
}

impl AnthropicContentBlock {
    /// Plain text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            citations: None,
            cache_control: None,
        }
    }

    /// Block type as sent on the wire
    pub fn block_type(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Document { .. } => "document",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Thinking { .. } => "thinking",
            Self::RedactedThinking { .. } => "redacted_thinking",
            Self::ServerToolUse { .. } => "server_tool_use",
            Self::Unknown(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Set cache control, returning false for blocks that cannot carry it
    pub fn set_cache_control(&mut self, control: AnthropicCacheControl) -> bool {
        match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::Document { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => {
                *cache_control = Some(control);
                true
            }
            Self::Thinking { .. } | Self::RedactedThinking { .. } | Self::ServerToolUse { .. } | Self::Unknown(_) => {
                false
            }
        }
    }
}

/// Source of image or document data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicSource {
    /// Base64-encoded bytes
    Base64 { media_type: String, data: String },
    /// Plain text (documents only)
    Text { media_type: String, data: String },
    /// Remote URL fetched by Anthropic
    Url { url: String },
}

/// Tool result content, scalar or block form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicToolResultContent {
    /// Plain string output
    Text(String),
    /// Text and image blocks
    Blocks(Vec<AnthropicContentBlock>),
}

/// Prompt caching marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicCacheControl {
    /// Always `ephemeral`
    #[serde(rename = "type")]
    pub control_type: String,
    /// `5m` or `1h`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

impl AnthropicCacheControl {
    pub fn ephemeral(ttl: Option<String>) -> Self {
        Self {
            control_type: "ephemeral".to_owned(),
            ttl,
        }
    }
}

/// Tool definition
///
/// Custom tools carry an input schema; server tools (`web_search_20250305`,
/// `bash_20250124`, ...) are passed through as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicTool {
    /// Client-executed tool
    Custom(AnthropicCustomTool),
    /// Provider-native tool, forwarded verbatim
    Native(Value),
}

/// Client-executed tool definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicCustomTool {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for tool input
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<AnthropicCacheControl>,
}

/// Anthropic tool choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicToolChoice {
    /// Choice type ("auto", "any", "tool", "none")
    #[serde(rename = "type")]
    pub choice_type: String,
    /// Specific tool name (when type is "tool")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AnthropicToolChoice {
    pub fn of(choice_type: &str) -> Self {
        Self {
            choice_type: choice_type.to_owned(),
            name: None,
        }
    }
}

/// Request metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicMetadata {
    /// Opaque end-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Extended thinking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicThinking {
    /// "enabled" or "disabled"
    #[serde(rename = "type")]
    pub thinking_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

// -- Response types --

/// Anthropic messages API response
///
/// Also the running message of a streamed response, seeded by
/// `message_start` and completed by the following events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Object type (always "message")
    #[serde(rename = "type", default)]
    pub response_type: String,
    /// Role (always "assistant")
    #[serde(default)]
    pub role: String,
    /// Response content blocks
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Reason generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence that triggered the stop
    #[serde(default)]
    pub stop_sequence: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: AnthropicUsage,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    /// Input token count
    #[serde(default)]
    pub input_tokens: u64,
    /// Output token count
    #[serde(default)]
    pub output_tokens: u64,
    /// Tokens written to the prompt cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    /// Tokens read from the prompt cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
}

// -- Streaming types --

/// Server-sent event payload from the Anthropic streaming API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Start of a message; carries the message skeleton
    MessageStart { message: AnthropicResponse },
    /// Start of a content block
    ContentBlockStart {
        index: usize,
        content_block: AnthropicContentBlock,
    },
    /// Incremental content within a block
    ContentBlockDelta { index: usize, delta: AnthropicStreamDelta },
    /// End of a content block
    ContentBlockStop { index: usize },
    /// Top-level message changes (stop reason, cumulative usage)
    MessageDelta {
        delta: AnthropicMessageDelta,
        #[serde(default)]
        usage: Option<AnthropicDeltaUsage>,
    },
    /// End of the message
    MessageStop,
    /// Keepalive
    Ping,
    /// Error mid-stream
    Error { error: AnthropicErrorDetail },
    /// Event types added after this version
    #[serde(untagged)]
    Unknown(Value),
}

/// Delta payload within a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    /// Text fragment
    TextDelta { text: String },
    /// Partial JSON for tool input
    InputJsonDelta { partial_json: String },
    /// Thinking fragment
    ThinkingDelta { thinking: String },
    /// Thinking signature, sent once before the block stops
    SignatureDelta { signature: String },
    /// Citation attached to the current text block
    CitationsDelta { citation: Value },
    /// Delta types added after this version
    #[serde(untagged)]
    Unknown(Value),
}

/// Message-level delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Cumulative usage reported by `message_delta`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicDeltaUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
}

// -- Error types --

/// Anthropic error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicErrorResponse {
    /// Error details
    pub error: AnthropicErrorDetail,
}

/// Anthropic error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnthropicErrorDetail {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_block_type_keeps_raw_json() {
        let raw = json!({
            "type": "web_search_tool_result",
            "tool_use_id": "srvtoolu_1",
            "content": []
        });
        let block: AnthropicContentBlock = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block, AnthropicContentBlock::Unknown(raw));
        assert_eq!(block.block_type(), "web_search_tool_result");
    }

    #[test]
    fn tool_result_accepts_string_or_blocks() {
        let block: AnthropicContentBlock = serde_json::from_value(json!({
            "type": "tool_result",
            "tool_use_id": "toolu_1",
            "content": "sunny"
        }))
        .unwrap();
        assert!(matches!(
            block,
            AnthropicContentBlock::ToolResult {
                content: Some(AnthropicToolResultContent::Text(ref s)),
                ..
            } if s == "sunny"
        ));
    }

    #[test]
    fn request_flattens_passthrough_fields() {
        let mut extra = Map::new();
        extra.insert("container".to_owned(), json!("ctr_1"));
        let request = AnthropicRequest {
            model: "claude-sonnet-4-5".to_owned(),
            max_tokens: 1024,
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: vec![AnthropicContentBlock::text("hi")],
            }],
            extra,
            ..AnthropicRequest::default()
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
                "container": "ctr_1"
            })
        );
    }

    #[test]
    fn native_tool_round_trips_verbatim() {
        let raw = json!({"type": "web_search_20250305", "name": "web_search", "max_uses": 3});
        let tool: AnthropicTool = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(tool, AnthropicTool::Native(raw.clone()));
        assert_eq!(serde_json::to_value(&tool).unwrap(), raw);
    }

    #[test]
    fn unknown_stream_event_is_tolerated() {
        let event: AnthropicStreamEvent =
            serde_json::from_str(r#"{"type":"content_block_hint","index":0}"#).unwrap();
        assert!(matches!(event, AnthropicStreamEvent::Unknown(_)));

        let event: AnthropicStreamEvent = serde_json::from_str(r#"{"type":"message_stop"}"#).unwrap();
        assert_eq!(event, AnthropicStreamEvent::MessageStop);
    }
}
