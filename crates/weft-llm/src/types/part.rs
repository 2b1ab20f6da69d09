use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extension::Extension;
use super::message::Metadata;

/// Metadata key holding an opaque provider signature
///
/// Carries Anthropic thinking signatures and Gemini `thoughtSignature`s.
/// The value is echoed back byte-for-byte and never interpreted.
pub const SIGNATURE_KEY: &str = "signature";

/// One unit of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// The single semantic payload of this part
    #[serde(flatten)]
    pub content: PartContent,
    /// Free-form annotations (signatures, provider hints)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Payload of a [`Part`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartContent {
    /// Plain text
    Text(String),

    /// Media or data referenced by URI
    Media(Media),

    /// A tool call emitted by the model
    ToolRequest {
        name: String,
        #[serde(default)]
        input: Value,
        /// Correlation id tying the call to its response
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
    },

    /// The result of a tool call, supplied by the caller
    ToolResponse {
        name: String,
        #[serde(default)]
        output: Value,
        #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
        reference: Option<String>,
        /// Auxiliary multipart content (e.g. an image the tool produced)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        content: Vec<Part>,
    },

    /// Model reasoning text; the signature lives in metadata
    Reasoning(String),

    /// Provider extension content
    Custom(Extension),
}

/// A media reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    /// `http(s)://`, `data:`, `gs://`, `file://`, or a local path
    pub url: String,
    /// MIME type, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl From<PartContent> for Part {
    fn from(content: PartContent) -> Self {
        Self {
            content,
            metadata: Metadata::new(),
        }
    }
}

impl Part {
    /// Text part
    pub fn text(text: impl Into<String>) -> Self {
        PartContent::Text(text.into()).into()
    }

    /// Media part
    pub fn media(url: impl Into<String>, content_type: Option<&str>) -> Self {
        PartContent::Media(Media {
            url: url.into(),
            content_type: content_type.map(str::to_owned),
        })
        .into()
    }

    /// Tool request part
    pub fn tool_request(name: impl Into<String>, input: Value, reference: Option<String>) -> Self {
        PartContent::ToolRequest {
            name: name.into(),
            input,
            reference,
        }
        .into()
    }

    /// Tool response part with no auxiliary content
    pub fn tool_response(name: impl Into<String>, output: Value, reference: Option<String>) -> Self {
        PartContent::ToolResponse {
            name: name.into(),
            output,
            reference,
            content: Vec::new(),
        }
        .into()
    }

    /// Reasoning part, optionally carrying the provider signature
    pub fn reasoning(text: impl Into<String>, signature: Option<String>) -> Self {
        Self::from(PartContent::Reasoning(text.into())).with_signature(signature)
    }

    /// Extension part
    pub fn custom(extension: Extension) -> Self {
        PartContent::Custom(extension).into()
    }

    /// Attach a signature, if any
    #[must_use]
    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        if let Some(signature) = signature {
            self.metadata.insert(SIGNATURE_KEY.to_owned(), Value::String(signature));
        }
        self
    }

    /// The opaque provider signature, if present
    pub fn signature(&self) -> Option<&str> {
        self.metadata.get(SIGNATURE_KEY).and_then(Value::as_str)
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            PartContent::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_reasoning(&self) -> Option<&str> {
        match &self.content {
            PartContent::Reasoning(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&Media> {
        match &self.content {
            PartContent::Media(media) => Some(media),
            _ => None,
        }
    }

    pub fn as_extension(&self) -> Option<&Extension> {
        match &self.content {
            PartContent::Custom(extension) => Some(extension),
            _ => None,
        }
    }

    /// Short name of the payload kind, used in error messages
    pub const fn kind(&self) -> &'static str {
        match &self.content {
            PartContent::Text(_) => "text",
            PartContent::Media(_) => "media",
            PartContent::ToolRequest { .. } => "toolRequest",
            PartContent::ToolResponse { .. } => "toolResponse",
            PartContent::Reasoning(_) => "reasoning",
            PartContent::Custom(_) => "custom",
        }
    }
}
