use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider extension content with no first-class canonical representation
///
/// Serialized externally tagged, e.g.
/// `{"executableCode": {"language": "PYTHON", "code": "print(1)"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Extension {
    /// Code the model asked the provider to execute (Gemini code execution)
    #[serde(rename_all = "camelCase")]
    ExecutableCode { language: String, code: String },

    /// Result of provider-side code execution
    #[serde(rename_all = "camelCase")]
    CodeExecutionResult {
        outcome: String,
        #[serde(default)]
        output: String,
    },

    /// A tool the provider runs itself (e.g. Anthropic web search)
    #[serde(rename_all = "camelCase")]
    ServerToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
        /// Provider block type, usually `server_tool_use`
        kind: String,
    },

    /// Result of a server-side tool, kept verbatim
    #[serde(rename_all = "camelCase")]
    ServerToolResult {
        tool_use_id: String,
        /// Provider block type, e.g. `web_search_tool_result`
        kind: String,
        #[serde(default)]
        content: Value,
    },

    /// Encrypted thinking that must be echoed back unchanged
    RedactedThinking { data: String },

    /// Provider content this version does not understand
    ///
    /// Kept raw so callers can still inspect it and so it can be echoed back
    /// to the provider that produced it.
    Unrecognized { kind: String, raw: Value },
}

impl Extension {
    /// Short name of the extension kind, matching its serialized tag
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ExecutableCode { .. } => "executableCode",
            Self::CodeExecutionResult { .. } => "codeExecutionResult",
            Self::ServerToolUse { .. } => "serverToolUse",
            Self::ServerToolResult { .. } => "serverToolResult",
            Self::RedactedThinking { .. } => "redactedThinking",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}
