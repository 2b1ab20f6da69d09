use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{Message, Role};
use super::part::Part;

/// Why the model stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Natural stop, stop sequence, or tool call
    Stop,
    /// Token limit reached
    Length,
    /// Safety or policy block
    Blocked,
    /// Malformed or unsupported output
    Other,
    #[default]
    Unknown,
}

/// Token counters; zero when the provider reports nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_content_tokens: u64,
    pub thoughts_tokens: u64,
}

/// Result of a generate call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// The model message; absent when the prompt itself was blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_message: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    /// Raw provider payload for callers that need more than the canonical shape
    #[serde(default)]
    pub custom: Value,
}

impl GenerateResponse {
    /// Concatenated text of the message, empty when there is none
    pub fn text(&self) -> String {
        self.message.as_ref().map(Message::text).unwrap_or_default()
    }

    /// Record a value under a top-level key of `custom`
    pub(crate) fn annotate(&mut self, key: &str, value: Value) {
        if !self.custom.is_object() {
            self.custom = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.custom {
            map.insert(key.to_owned(), value);
        }
    }
}

/// Incremental content handed to a streaming callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateChunk {
    pub role: Role,
    /// Index of the message this chunk belongs to
    pub index: u32,
    /// Only the parts added since the previous chunk
    pub content: Vec<Part>,
}

impl GenerateChunk {
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Part::as_text).collect()
    }
}
