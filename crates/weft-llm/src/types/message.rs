use serde::{Deserialize, Serialize};

use super::part::{Part, PartContent};

/// Arbitrary key/value annotations on a message or part
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User turn
    User,
    /// Model output
    Model,
    /// Tool results
    Tool,
}

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Part>,
    /// Annotations such as cache boundaries (`"cache"`)
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Message {
    pub fn new(role: Role, content: Vec<Part>) -> Self {
        Self {
            role,
            content,
            metadata: Metadata::new(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenation of all text parts, in order
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Part::as_text).collect()
    }

    /// Tool request parts, in order
    pub fn tool_requests(&self) -> impl Iterator<Item = &Part> {
        self.content
            .iter()
            .filter(|part| matches!(part.content, PartContent::ToolRequest { .. }))
    }
}
