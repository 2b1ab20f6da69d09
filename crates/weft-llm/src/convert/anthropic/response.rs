//! Normalization of Anthropic messages

use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicResponse, AnthropicUsage};
use crate::types::{FinishReason, GenerateResponse, Message, Role, Usage};

use super::parts::to_part;

/// Convert a complete (or fully streamed) Anthropic message
pub fn normalize(response: &AnthropicResponse) -> Result<GenerateResponse, LlmError> {
    let content = response.content.iter().map(to_part).collect();

    let custom = serde_json::to_value(response)
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode Anthropic response: {e}")))?;

    Ok(GenerateResponse {
        message: Some(Message::new(Role::Model, content)),
        finish_reason: finish_reason(response.stop_reason.as_deref()),
        finish_message: response
            .stop_sequence
            .as_ref()
            .map(|sequence| format!("stop sequence: {sequence}")),
        usage: usage(&response.usage),
        custom,
    })
}

/// Map an Anthropic `stop_reason`
pub fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("end_turn" | "stop_sequence" | "tool_use") => FinishReason::Stop,
        Some("refusal") => FinishReason::Blocked,
        _ => FinishReason::Unknown,
    }
}

fn usage(usage: &AnthropicUsage) -> Usage {
    Usage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        cached_content_tokens: usage.cache_read_input_tokens.unwrap_or_default(),
        thoughts_tokens: 0,
    }
}
