//! Stream fold for Gemini `streamGenerateContent` chunks

use crate::error::LlmError;
use crate::protocol::google::{GoogleCandidate, GoogleContent, GooglePart, GoogleResponse};
use crate::stream::{FoldStep, StreamFold};
use crate::types::GenerateResponse;

use super::parts::to_part;
use super::response::normalize;

/// Folds Gemini response chunks into one response
///
/// Each chunk is a partial `GenerateContentResponse`. Parts are appended per
/// candidate; adjacent text of the same kind is concatenated so the folded
/// response has the shape a blocking call returns. Only the first candidate
/// is emitted to the callback. There is no terminal event: the response is
/// complete when the stream ends.
#[derive(Debug, Default)]
pub struct GoogleStreamFold {
    response: GoogleResponse,
}

impl GoogleStreamFold {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidate_mut(&mut self, index: u32) -> &mut GoogleCandidate {
        let position = self
            .response
            .candidates
            .iter()
            .position(|candidate| candidate.index.unwrap_or(0) == index);

        if let Some(position) = position {
            return &mut self.response.candidates[position];
        }
        self.response.candidates.push(GoogleCandidate {
            index: Some(index),
            ..GoogleCandidate::default()
        });
        let last = self.response.candidates.len() - 1;
        &mut self.response.candidates[last]
    }
}

/// Append `part`, joining it onto the previous part when both are plain
/// text of the same kind and at most one carries a signature
///
/// Parts with unknown fields are never joined so the fields survive.
fn append_part(parts: &mut Vec<GooglePart>, part: GooglePart) {
    if let Some(last) = parts.last_mut()
        && last.is_text()
        && part.is_text()
        && last.extra.is_empty()
        && part.extra.is_empty()
        && last.is_thought() == part.is_thought()
        && (last.thought_signature.is_none() || part.thought_signature.is_none())
        && let (Some(text), Some(more)) = (last.text.as_mut(), part.text.as_deref())
    {
        text.push_str(more);
        if last.thought_signature.is_none() {
            last.thought_signature = part.thought_signature;
        }
        return;
    }
    parts.push(part);
}

impl StreamFold for GoogleStreamFold {
    type Event = GoogleResponse;

    fn merge(&mut self, chunk: GoogleResponse) -> Result<FoldStep, LlmError> {
        let mut emitted = Vec::new();

        for incoming in chunk.candidates {
            let index = incoming.index.unwrap_or(0);

            if index == 0
                && let Some(content) = &incoming.content
            {
                for part in &content.parts {
                    emitted.push(to_part(part)?);
                }
            }

            let candidate = self.candidate_mut(index);
            if let Some(content) = incoming.content {
                let merged = candidate.content.get_or_insert_with(|| GoogleContent {
                    role: content.role.clone(),
                    parts: Vec::new(),
                });
                for part in content.parts {
                    append_part(&mut merged.parts, part);
                }
            }
            if incoming.finish_reason.is_some() {
                candidate.finish_reason = incoming.finish_reason;
            }
            if incoming.finish_message.is_some() {
                candidate.finish_message = incoming.finish_message;
            }
            if incoming.safety_ratings.is_some() {
                candidate.safety_ratings = incoming.safety_ratings;
            }
            if incoming.citation_metadata.is_some() {
                candidate.citation_metadata = incoming.citation_metadata;
            }
            if incoming.grounding_metadata.is_some() {
                candidate.grounding_metadata = incoming.grounding_metadata;
            }
        }

        if chunk.usage_metadata.is_some() {
            self.response.usage_metadata = chunk.usage_metadata;
        }
        if chunk.prompt_feedback.is_some() {
            self.response.prompt_feedback = chunk.prompt_feedback;
        }
        if chunk.model_version.is_some() {
            self.response.model_version = chunk.model_version;
        }
        if chunk.response_id.is_some() {
            self.response.response_id = chunk.response_id;
        }

        Ok(FoldStep::parts(emitted))
    }

    fn finish(self) -> Result<GenerateResponse, LlmError> {
        normalize(&self.response)
    }

    fn completes_at_end(&self) -> bool {
        true
    }
}
