//! Conversion between canonical types and provider wire formats
//!
//! Each provider module has the same shape:
//!
//! - `config`: the provider's typed config and its single coercion entry
//! - `parts`: content-part conversion in both directions
//! - request assembly (`build_request`) in the module root
//! - `response`: normalization of a complete provider message
//! - `stream`: the provider's [`StreamFold`](crate::stream::StreamFold)

pub mod anthropic;
pub mod google;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::cache::CacheHandle;
use crate::error::LlmError;
use crate::media::MediaResolver;
use crate::types::{Message, Part, PartContent, Role, ToolDefinition};

/// Everything request assembly needs besides the request itself
#[derive(Clone, Copy)]
pub struct AssemblyContext<'a> {
    /// Provider-side model id
    pub model: &'a str,
    /// Resolver for media the provider cannot fetch itself
    pub media: &'a dyn MediaResolver,
    /// Handle from the context cache, if it produced one
    pub cache: Option<&'a CacheHandle>,
    /// Provider-configured `max_tokens` default
    pub default_max_tokens: Option<u32>,
}

/// Reject the whole tool list if any name breaks the provider's rule
pub(crate) fn validate_tool_names(
    tools: &[ToolDefinition],
    rule: &Regex,
    pattern: &'static str,
) -> Result<(), LlmError> {
    match tools.iter().find(|tool| !rule.is_match(&tool.name)) {
        Some(tool) => Err(LlmError::InvalidToolName {
            name: tool.name.clone(),
            pattern,
        }),
        None => Ok(()),
    }
}

/// Text of every system message, one entry per text part
pub(crate) fn system_texts(messages: &[Message]) -> Result<Vec<&str>, LlmError> {
    let mut texts = Vec::new();
    for message in messages.iter().filter(|m| m.role == Role::System) {
        for part in &message.content {
            match &part.content {
                PartContent::Text(text) => texts.push(text.as_str()),
                _ => {
                    return Err(LlmError::InvalidRequest(format!(
                        "system messages may only contain text, found a {} part",
                        part.kind()
                    )));
                }
            }
        }
    }
    Ok(texts)
}

pub(crate) fn has_system_messages(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.role == Role::System)
}

/// Copy raw config keys onto the outgoing request
///
/// Keys the assembler owns are skipped so passthrough never overrides the
/// canonical wiring.
pub(crate) fn merge_passthrough(target: &mut Map<String, Value>, source: &Map<String, Value>, reserved: &[&str]) {
    for (key, value) in source {
        if reserved.contains(&key.as_str()) {
            tracing::debug!(key = %key, "skipping passthrough key owned by request assembly");
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

/// Decode a raw JSON config map into a provider config
pub(crate) fn decode_raw_config<T: DeserializeOwned>(value: &Value, provider: &str) -> Result<T, LlmError> {
    if !value.is_object() {
        return Err(LlmError::Config(format!(
            "{provider} config must be a JSON object, got {}",
            json_kind(value)
        )));
    }
    serde_json::from_value(value.clone()).map_err(|e| LlmError::Config(format!("invalid {provider} config: {e}")))
}

/// Tool output as the text form providers take for scalar results
pub(crate) fn output_text(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Name of a JSON value's type, for error messages
pub(crate) const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Whether the part list has anything worth sending
pub(crate) fn is_empty_turn(parts: &[Part]) -> bool {
    parts.iter().all(|part| matches!(&part.content, PartContent::Text(text) if text.is_empty()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_invalid_tool_name_is_reported() {
        let rule = Regex::new("^[a-z]+$").unwrap();
        let tools = vec![
            ToolDefinition::new("ok", "", None),
            ToolDefinition::new("not/ok", "", None),
        ];
        let err = validate_tool_names(&tools, &rule, "^[a-z]+$").unwrap_err();
        assert!(matches!(err, LlmError::InvalidToolName { ref name, .. } if name == "not/ok"));
    }

    #[test]
    fn passthrough_skips_reserved_keys() {
        let mut target = Map::new();
        target.insert("tools".to_owned(), json!(["canonical"]));
        let source = json!({"tools": ["raw"], "container": "ctr_1"});

        merge_passthrough(&mut target, source.as_object().unwrap(), &["tools"]);

        assert_eq!(Value::Object(target), json!({"tools": ["canonical"], "container": "ctr_1"}));
    }

    #[test]
    fn system_texts_reject_media() {
        let messages = vec![Message::new(Role::System, vec![Part::media("https://x/y.png", None)])];
        assert!(matches!(system_texts(&messages), Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn raw_config_must_be_an_object() {
        let err = decode_raw_config::<Map<String, Value>>(&json!([1, 2]), "Anthropic").unwrap_err();
        assert_eq!(err.to_string(), "invalid config: Anthropic config must be a JSON object, got an array");
    }
}
