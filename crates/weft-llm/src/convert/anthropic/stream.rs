//! Stream fold for Anthropic server-sent events

use std::collections::HashMap;

use serde_json::Value;

use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicResponse, AnthropicStreamDelta, AnthropicStreamEvent,
};
use crate::stream::{FoldStep, StreamFold};
use crate::types::{GenerateResponse, Part};

use super::parts::to_part;
use super::response::normalize;

/// Folds Anthropic stream events into a running message
///
/// Text and thinking deltas are emitted as they arrive. Blocks whose content
/// is only meaningful once complete (tool use, server tool results, unknown
/// blocks) are emitted once, at `content_block_stop`.
#[derive(Debug, Default)]
pub struct AnthropicStreamFold {
    message: AnthropicResponse,
    /// Tool input JSON accumulated per block index
    partial_json: HashMap<usize, String>,
}

impl AnthropicStreamFold {
    pub fn new() -> Self {
        Self::default()
    }

    fn block_mut(&mut self, index: usize) -> Result<&mut AnthropicContentBlock, LlmError> {
        self.message
            .content
            .get_mut(index)
            .ok_or_else(|| LlmError::Streaming(format!("delta for unknown content block {index}")))
    }

    /// Blocks arrive in index order; an index past the end is a protocol error
    fn start_block(&mut self, index: usize, block: AnthropicContentBlock) -> Result<Vec<Part>, LlmError> {
        let len = self.message.content.len();
        if index > len {
            return Err(LlmError::Streaming(format!(
                "content block {index} started while only {len} blocks exist"
            )));
        }

        let emitted = match &block {
            AnthropicContentBlock::Text { text, .. } if !text.is_empty() => vec![Part::text(text.clone())],
            AnthropicContentBlock::Thinking { thinking, .. } if !thinking.is_empty() => {
                vec![Part::reasoning(thinking.clone(), None)]
            }
            AnthropicContentBlock::ToolUse { .. } | AnthropicContentBlock::ServerToolUse { .. } => {
                self.partial_json.insert(index, String::new());
                Vec::new()
            }
            _ => Vec::new(),
        };

        if index < len {
            self.message.content[index] = block;
        } else {
            self.message.content.push(block);
        }

        Ok(emitted)
    }

    fn apply_delta(&mut self, index: usize, delta: AnthropicStreamDelta) -> Result<Vec<Part>, LlmError> {
        if let AnthropicStreamDelta::InputJsonDelta { partial_json } = &delta {
            self.partial_json.entry(index).or_default().push_str(partial_json);
            return Ok(Vec::new());
        }

        let block = self.block_mut(index)?;
        let emitted = match (block, delta) {
            (AnthropicContentBlock::Text { text, .. }, AnthropicStreamDelta::TextDelta { text: fragment }) => {
                text.push_str(&fragment);
                vec![Part::text(fragment)]
            }
            (AnthropicContentBlock::Text { citations, .. }, AnthropicStreamDelta::CitationsDelta { citation }) => {
                citations.get_or_insert_with(Vec::new).push(citation);
                Vec::new()
            }
            (
                AnthropicContentBlock::Thinking { thinking, .. },
                AnthropicStreamDelta::ThinkingDelta { thinking: fragment },
            ) => {
                thinking.push_str(&fragment);
                vec![Part::reasoning(fragment, None)]
            }
            (AnthropicContentBlock::Thinking { signature, .. }, AnthropicStreamDelta::SignatureDelta { signature: s }) => {
                signature.push_str(&s);
                Vec::new()
            }
            (_, AnthropicStreamDelta::Unknown(raw)) => {
                tracing::debug!(delta = %raw, "ignoring unknown Anthropic delta");
                Vec::new()
            }
            (block, delta) => {
                return Err(LlmError::Streaming(format!(
                    "delta {delta:?} does not apply to a {} block",
                    block.block_type()
                )));
            }
        };

        Ok(emitted)
    }

    fn stop_block(&mut self, index: usize) -> Result<Vec<Part>, LlmError> {
        let partial = self.partial_json.remove(&index);
        let block = self.block_mut(index)?;

        if let Some(json) = partial {
            let parsed = if json.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&json)
                    .map_err(|e| LlmError::Streaming(format!("invalid tool input JSON in block {index}: {e}")))?
            };
            if let AnthropicContentBlock::ToolUse { input, .. } | AnthropicContentBlock::ServerToolUse { input, .. } =
                &mut *block
            {
                *input = parsed;
            }
        }

        // Text and thinking were already emitted delta by delta
        Ok(match &*block {
            AnthropicContentBlock::Text { .. } | AnthropicContentBlock::Thinking { .. } => Vec::new(),
            other => vec![to_part(other)],
        })
    }
}

impl StreamFold for AnthropicStreamFold {
    type Event = AnthropicStreamEvent;

    fn merge(&mut self, event: AnthropicStreamEvent) -> Result<FoldStep, LlmError> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.message = message;
                Ok(FoldStep::default())
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => {
                Ok(FoldStep::parts(self.start_block(index, content_block)?))
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => Ok(FoldStep::parts(self.apply_delta(index, delta)?)),
            AnthropicStreamEvent::ContentBlockStop { index } => Ok(FoldStep::parts(self.stop_block(index)?)),
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.message.stop_reason = delta.stop_reason;
                }
                if delta.stop_sequence.is_some() {
                    self.message.stop_sequence = delta.stop_sequence;
                }
                if let Some(usage) = usage {
                    let target = &mut self.message.usage;
                    if let Some(input) = usage.input_tokens {
                        target.input_tokens = input;
                    }
                    if let Some(output) = usage.output_tokens {
                        target.output_tokens = output;
                    }
                    if usage.cache_creation_input_tokens.is_some() {
                        target.cache_creation_input_tokens = usage.cache_creation_input_tokens;
                    }
                    if usage.cache_read_input_tokens.is_some() {
                        target.cache_read_input_tokens = usage.cache_read_input_tokens;
                    }
                }
                Ok(FoldStep::default())
            }
            AnthropicStreamEvent::MessageStop => Ok(FoldStep::terminal()),
            AnthropicStreamEvent::Ping => Ok(FoldStep::default()),
            AnthropicStreamEvent::Error { error } => Err(LlmError::upstream(
                "anthropic",
                None,
                format!("{}: {}", error.error_type, error.message),
            )),
            AnthropicStreamEvent::Unknown(raw) => {
                tracing::debug!(event = %raw, "ignoring unknown Anthropic stream event");
                Ok(FoldStep::default())
            }
        }
    }

    fn finish(self) -> Result<GenerateResponse, LlmError> {
        normalize(&self.message)
    }
}
