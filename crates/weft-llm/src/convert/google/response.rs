//! Normalization of Google `generateContent` responses

use crate::error::LlmError;
use crate::protocol::google::{GoogleCandidate, GoogleResponse, GoogleUsageMetadata};
use crate::types::{FinishReason, GenerateResponse, Message, Role, Usage};

use super::parts::to_part;

/// Convert a complete (or fully streamed) response
///
/// The canonical message comes from the first candidate; every candidate
/// stays available under `custom.candidates`.
///
/// # Errors
///
/// Fails when a part violates the one-payload rule.
pub fn normalize(response: &GoogleResponse) -> Result<GenerateResponse, LlmError> {
    let custom = serde_json::to_value(response)
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("failed to encode Google response: {e}")))?;
    let usage = response.usage_metadata.as_ref().map(usage).unwrap_or_default();

    let Some(candidate) = primary_candidate(response) else {
        let block_reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.clone());
        if let Some(reason) = &block_reason {
            tracing::warn!(block_reason = %reason, "Google blocked the prompt");
        }
        return Ok(GenerateResponse {
            message: None,
            finish_reason: if block_reason.is_some() {
                FinishReason::Blocked
            } else {
                FinishReason::Unknown
            },
            finish_message: response
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason_message.clone())
                .or(block_reason),
            usage,
            custom,
        });
    };

    let mut content = Vec::new();
    if let Some(candidate_content) = &candidate.content {
        for part in &candidate_content.parts {
            content.push(to_part(part)?);
        }
    }

    Ok(GenerateResponse {
        message: Some(Message::new(Role::Model, content)),
        finish_reason: finish_reason(candidate.finish_reason.as_deref()),
        finish_message: candidate.finish_message.clone(),
        usage,
        custom,
    })
}

fn primary_candidate(response: &GoogleResponse) -> Option<&GoogleCandidate> {
    response
        .candidates
        .iter()
        .find(|candidate| candidate.index.unwrap_or(0) == 0)
        .or_else(|| response.candidates.first())
}

/// Map a Gemini `finishReason`
pub fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY") => {
            FinishReason::Blocked
        }
        Some("MALFORMED_FUNCTION_CALL" | "UNEXPECTED_TOOL_CALL" | "LANGUAGE" | "OTHER") => FinishReason::Other,
        _ => FinishReason::Unknown,
    }
}

const fn usage(metadata: &GoogleUsageMetadata) -> Usage {
    Usage {
        input_tokens: metadata.prompt_token_count,
        output_tokens: metadata.candidates_token_count,
        total_tokens: metadata.total_token_count,
        cached_content_tokens: metadata.cached_content_token_count,
        thoughts_tokens: metadata.thoughts_token_count,
    }
}
