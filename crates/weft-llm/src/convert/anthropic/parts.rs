//! Content-part conversion for the Anthropic Messages API

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::convert::output_text;
use crate::error::LlmError;
use crate::media::MediaResolver;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicSource, AnthropicToolResultContent};
use crate::types::{Extension, Media, Part, PartContent};

/// Block type used for Anthropic-executed tool calls
const SERVER_TOOL_USE: &str = "server_tool_use";

// -- Outbound: canonical parts to Anthropic blocks --

/// Convert parts in order, one block per part
pub async fn to_blocks(parts: &[Part], media: &dyn MediaResolver) -> Result<Vec<AnthropicContentBlock>, LlmError> {
    let mut blocks = Vec::with_capacity(parts.len());
    for part in parts {
        blocks.push(to_block(part, media).await?);
    }
    Ok(blocks)
}

/// Convert a single part
pub async fn to_block(part: &Part, media: &dyn MediaResolver) -> Result<AnthropicContentBlock, LlmError> {
    match &part.content {
        PartContent::Text(text) => Ok(AnthropicContentBlock::text(text.clone())),

        PartContent::Media(item) => media_block(item, media).await,

        PartContent::ToolRequest { name, input, reference } => Ok(AnthropicContentBlock::ToolUse {
            id: reference.clone().unwrap_or_else(|| name.clone()),
            name: name.clone(),
            input: if input.is_null() { json!({}) } else { input.clone() },
            cache_control: None,
        }),

        PartContent::ToolResponse {
            name,
            output,
            reference,
            content,
        } => {
            let result = if content.is_empty() {
                AnthropicToolResultContent::Text(output_text(output))
            } else {
                let mut blocks = vec![AnthropicContentBlock::text(output_text(output))];
                for aux in content {
                    blocks.push(aux_block(aux, media).await?);
                }
                AnthropicToolResultContent::Blocks(blocks)
            };
            Ok(AnthropicContentBlock::ToolResult {
                tool_use_id: reference.clone().unwrap_or_else(|| name.clone()),
                content: Some(result),
                is_error: None,
                cache_control: None,
            })
        }

        PartContent::Reasoning(text) => {
            let signature = part.signature().ok_or_else(|| {
                LlmError::Conversion("reasoning part has no signature; Anthropic requires one".to_owned())
            })?;
            Ok(AnthropicContentBlock::Thinking {
                thinking: text.clone(),
                signature: signature.to_owned(),
            })
        }

        PartContent::Custom(extension) => extension_block(extension),
    }
}

/// Tool results carry only text, images, and documents
async fn aux_block(part: &Part, media: &dyn MediaResolver) -> Result<AnthropicContentBlock, LlmError> {
    match &part.content {
        PartContent::Text(text) => Ok(AnthropicContentBlock::text(text.clone())),
        PartContent::Media(item) => media_block(item, media).await,
        _ => Err(LlmError::Conversion(format!(
            "tool response content may only hold text or media, found a {} part",
            part.kind()
        ))),
    }
}

async fn media_block(item: &Media, media: &dyn MediaResolver) -> Result<AnthropicContentBlock, LlmError> {
    let resolved = media.resolve(item).await?;
    let content_type = resolved.content_type.as_str();

    if content_type.starts_with("image/") {
        return Ok(AnthropicContentBlock::Image {
            source: AnthropicSource::Base64 {
                media_type: content_type.to_owned(),
                data: resolved.base64(),
            },
            cache_control: None,
        });
    }

    match content_type {
        "application/pdf" => Ok(AnthropicContentBlock::Document {
            source: AnthropicSource::Base64 {
                media_type: content_type.to_owned(),
                data: resolved.base64(),
            },
            cache_control: None,
        }),
        "text/plain" => {
            let text = String::from_utf8(resolved.data)
                .map_err(|_| LlmError::Conversion("text/plain media is not valid UTF-8".to_owned()))?;
            Ok(AnthropicContentBlock::Document {
                source: AnthropicSource::Text {
                    media_type: "text/plain".to_owned(),
                    data: text,
                },
                cache_control: None,
            })
        }
        other => Err(LlmError::Conversion(format!(
            "Anthropic does not accept media of type `{other}`"
        ))),
    }
}

fn extension_block(extension: &Extension) -> Result<AnthropicContentBlock, LlmError> {
    match extension {
        Extension::RedactedThinking { data } => Ok(AnthropicContentBlock::RedactedThinking { data: data.clone() }),
        Extension::ServerToolUse { id, name, input, kind } if kind == SERVER_TOOL_USE => {
            Ok(AnthropicContentBlock::ServerToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            })
        }
        Extension::ServerToolUse { id, name, input, kind } => Ok(AnthropicContentBlock::Unknown(json!({
            "type": kind,
            "id": id,
            "name": name,
            "input": input,
        }))),
        Extension::ServerToolResult {
            tool_use_id,
            kind,
            content,
        } => Ok(AnthropicContentBlock::Unknown(json!({
            "type": kind,
            "tool_use_id": tool_use_id,
            "content": content,
        }))),
        Extension::Unrecognized { raw, .. } if raw.get("type").is_some_and(Value::is_string) => {
            Ok(AnthropicContentBlock::Unknown(raw.clone()))
        }
        other => Err(LlmError::Conversion(format!(
            "{} content cannot be sent to Anthropic",
            other.kind()
        ))),
    }
}

// -- Inbound: Anthropic blocks to canonical parts --

/// Convert a response block; never fails, unknown blocks degrade
pub fn to_part(block: &AnthropicContentBlock) -> Part {
    match block {
        AnthropicContentBlock::Text { text, citations, .. } => {
            let mut part = Part::text(text.clone());
            if let Some(citations) = citations.as_ref().filter(|c| !c.is_empty()) {
                part.metadata
                    .insert("citations".to_owned(), Value::Array(citations.clone()));
            }
            part
        }

        AnthropicContentBlock::Image { source, .. } | AnthropicContentBlock::Document { source, .. } => {
            source_part(source)
        }

        AnthropicContentBlock::ToolUse { id, name, input, .. } => {
            Part::tool_request(name.clone(), input.clone(), Some(id.clone()))
        }

        AnthropicContentBlock::ToolResult {
            tool_use_id, content, ..
        } => {
            let output = match content {
                Some(AnthropicToolResultContent::Text(text)) => Value::String(text.clone()),
                Some(AnthropicToolResultContent::Blocks(blocks)) => serde_json::to_value(blocks).unwrap_or_default(),
                None => Value::Null,
            };
            Part::tool_response(String::new(), output, Some(tool_use_id.clone()))
        }

        AnthropicContentBlock::Thinking { thinking, signature } => {
            let signature = (!signature.is_empty()).then(|| signature.clone());
            Part::reasoning(thinking.clone(), signature)
        }

        AnthropicContentBlock::RedactedThinking { data } => {
            Part::custom(Extension::RedactedThinking { data: data.clone() })
        }

        AnthropicContentBlock::ServerToolUse { id, name, input } => Part::custom(Extension::ServerToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
            kind: SERVER_TOOL_USE.to_owned(),
        }),

        AnthropicContentBlock::Unknown(raw) => unknown_part(raw),
    }
}

fn source_part(source: &AnthropicSource) -> Part {
    match source {
        AnthropicSource::Base64 { media_type, data } => {
            Part::media(format!("data:{media_type};base64,{data}"), Some(media_type))
        }
        AnthropicSource::Text { media_type, data } => Part::media(
            format!("data:{media_type};base64,{}", STANDARD.encode(data)),
            Some(media_type),
        ),
        AnthropicSource::Url { url } => Part::media(url.clone(), None),
    }
}

/// Server tool results become typed extensions; anything else is kept raw
fn unknown_part(raw: &Value) -> Part {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();

    if kind.ends_with("_tool_result")
        && let Some(tool_use_id) = raw.get("tool_use_id").and_then(Value::as_str)
    {
        return Part::custom(Extension::ServerToolResult {
            tool_use_id: tool_use_id.to_owned(),
            kind,
            content: raw.get("content").cloned().unwrap_or_default(),
        });
    }

    if kind.ends_with("_tool_use")
        && let (Some(id), Some(name)) = (
            raw.get("id").and_then(Value::as_str),
            raw.get("name").and_then(Value::as_str),
        )
    {
        return Part::custom(Extension::ServerToolUse {
            id: id.to_owned(),
            name: name.to_owned(),
            input: raw.get("input").cloned().unwrap_or_default(),
            kind,
        });
    }

    tracing::warn!(block_type = %kind, "unrecognized Anthropic content block");
    Part::custom(Extension::Unrecognized { kind, raw: raw.clone() })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::media::ResolvedMedia;

    /// Resolver that serves fixed bytes for every URI
    struct FixedMedia(&'static str, &'static [u8]);

    #[async_trait]
    impl MediaResolver for FixedMedia {
        async fn resolve(&self, _media: &Media) -> Result<ResolvedMedia, LlmError> {
            Ok(ResolvedMedia {
                content_type: self.0.to_owned(),
                data: self.1.to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn reasoning_signature_round_trips() {
        let part = Part::reasoning("let me think", Some("EqQBCkYIBxgCKkD+/=".to_owned()));
        let block = to_block(&part, &FixedMedia("", b"")).await.unwrap();
        assert_eq!(
            block,
            AnthropicContentBlock::Thinking {
                thinking: "let me think".to_owned(),
                signature: "EqQBCkYIBxgCKkD+/=".to_owned()
            }
        );

        let decoded = to_part(&block);
        assert_eq!(decoded.as_reasoning(), Some("let me think"));
        assert_eq!(decoded.signature(), Some("EqQBCkYIBxgCKkD+/="));
    }

    #[tokio::test]
    async fn reasoning_without_signature_is_rejected() {
        let err = to_block(&Part::reasoning("hmm", None), &FixedMedia("", b""))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Conversion(_)));
    }

    #[tokio::test]
    async fn tool_ref_survives_request_and_response() {
        let request = Part::tool_request("get_weather", json!({"city": "Oslo"}), Some("toolu_01".to_owned()));
        let response = Part::tool_response("get_weather", json!({"temp": 4}), Some("toolu_01".to_owned()));
        let media = FixedMedia("", b"");

        let use_block = to_block(&request, &media).await.unwrap();
        let result_block = to_block(&response, &media).await.unwrap();

        let AnthropicContentBlock::ToolUse { id, .. } = &use_block else {
            panic!("expected tool_use");
        };
        let AnthropicContentBlock::ToolResult {
            tool_use_id, content, ..
        } = &result_block
        else {
            panic!("expected tool_result");
        };
        assert_eq!(id, "toolu_01");
        assert_eq!(tool_use_id, "toolu_01");
        assert_eq!(content, &Some(AnthropicToolResultContent::Text(r#"{"temp":4}"#.to_owned())));

        let PartContent::ToolRequest { reference, .. } = to_part(&use_block).content else {
            panic!("expected tool request");
        };
        assert_eq!(reference.as_deref(), Some("toolu_01"));
        let PartContent::ToolResponse { reference, .. } = to_part(&result_block).content else {
            panic!("expected tool response");
        };
        assert_eq!(reference.as_deref(), Some("toolu_01"));
    }

    #[tokio::test]
    async fn tool_response_with_image_uses_block_form() {
        let mut response = Part::tool_response("render", json!("done"), Some("toolu_02".to_owned()));
        if let PartContent::ToolResponse { content, .. } = &mut response.content {
            content.push(Part::media("https://example.com/chart.png", None));
        }

        let block = to_block(&response, &FixedMedia("image/png", &[1, 2])).await.unwrap();
        let AnthropicContentBlock::ToolResult {
            content: Some(AnthropicToolResultContent::Blocks(blocks)),
            ..
        } = block
        else {
            panic!("expected block-form tool result");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], AnthropicContentBlock::text("done"));
        assert!(matches!(
            &blocks[1],
            AnthropicContentBlock::Image { source: AnthropicSource::Base64 { media_type, data }, .. }
                if media_type == "image/png" && data == "AQI="
        ));
    }

    #[tokio::test]
    async fn media_types_map_to_blocks() {
        let part = Part::media("https://example.com/paper.pdf", None);
        let block = to_block(&part, &FixedMedia("application/pdf", b"%PDF")).await.unwrap();
        assert_eq!(block.block_type(), "document");

        let block = to_block(&part, &FixedMedia("text/plain", b"notes")).await.unwrap();
        assert!(matches!(
            block,
            AnthropicContentBlock::Document { source: AnthropicSource::Text { ref data, .. }, .. } if data == "notes"
        ));

        let err = to_block(&part, &FixedMedia("video/mp4", b"")).await.unwrap_err();
        assert!(err.to_string().contains("video/mp4"));
    }

    #[test]
    fn unknown_block_becomes_exactly_one_unrecognized_part() {
        let raw = json!({"type": "mcp_hologram", "payload": 1});
        let part = to_part(&AnthropicContentBlock::Unknown(raw.clone()));
        assert_eq!(
            part.as_extension(),
            Some(&Extension::Unrecognized {
                kind: "mcp_hologram".to_owned(),
                raw
            })
        );
    }

    #[tokio::test]
    async fn server_tool_blocks_round_trip() {
        let use_block = AnthropicContentBlock::ServerToolUse {
            id: "srvtoolu_1".to_owned(),
            name: "web_search".to_owned(),
            input: json!({"query": "rust"}),
        };
        let result_raw = json!({
            "type": "web_search_tool_result",
            "tool_use_id": "srvtoolu_1",
            "content": [{"type": "web_search_result", "url": "https://www.rust-lang.org"}]
        });
        let result_block = AnthropicContentBlock::Unknown(result_raw.clone());
        let media = FixedMedia("", b"");

        let use_part = to_part(&use_block);
        let result_part = to_part(&result_block);
        assert!(matches!(
            result_part.as_extension(),
            Some(Extension::ServerToolResult { kind, .. }) if kind == "web_search_tool_result"
        ));

        assert_eq!(to_block(&use_part, &media).await.unwrap(), use_block);
        assert_eq!(to_block(&result_part, &media).await.unwrap(), result_block);
    }

    #[tokio::test]
    async fn code_execution_extension_is_rejected() {
        let part = Part::custom(Extension::ExecutableCode {
            language: "PYTHON".to_owned(),
            code: "1".to_owned(),
        });
        let err = to_block(&part, &FixedMedia("", b"")).await.unwrap_err();
        assert!(err.to_string().contains("executableCode"));
    }
}
