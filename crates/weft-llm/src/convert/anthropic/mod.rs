//! Anthropic Messages API conversion

mod config;
pub mod parts;
pub mod response;
pub mod stream;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

pub use config::{AnthropicConfig, ThinkingConfig};
pub use response::normalize;
pub use stream::AnthropicStreamFold;

use super::{AssemblyContext, has_system_messages, is_empty_turn, merge_passthrough, system_texts, validate_tool_names};
use crate::cache::{self, CacheHandle};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicCacheControl, AnthropicContentBlock, AnthropicCustomTool, AnthropicMessage, AnthropicMetadata,
    AnthropicRequest, AnthropicSystem, AnthropicThinking, AnthropicTool, AnthropicToolChoice,
};
use crate::types::{GenerateRequest, Role, ToolChoice};

/// Default `max_tokens` when neither the request nor the provider sets one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic tool names
pub const TOOL_NAME_PATTERN: &str = "^[a-zA-Z0-9_-]{1,64}$";

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(TOOL_NAME_PATTERN).expect("must be valid regex"));

/// Request fields set by assembly; raw config never overrides them
const RESERVED_KEYS: &[&str] = &[
    "model",
    "max_tokens",
    "system",
    "messages",
    "temperature",
    "top_p",
    "top_k",
    "stop_sequences",
    "stream",
    "tools",
    "tool_choice",
    "metadata",
    "service_tier",
    "thinking",
    "output_format",
];

/// Build an Anthropic request from a canonical request
///
/// # Errors
///
/// Fails before any network call on config coercion errors, conflicting
/// canonical and native fields, invalid tool names, or parts Anthropic
/// cannot represent. No partially built request is ever returned.
pub async fn build_request(request: &GenerateRequest, ctx: &AssemblyContext<'_>) -> Result<AnthropicRequest, LlmError> {
    let config = AnthropicConfig::coerce(&request.config)?;
    check_exclusive(request, &config)?;

    let mut wire = AnthropicRequest {
        model: ctx.model.to_owned(),
        max_tokens: config
            .max_tokens
            .or(ctx.default_max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        ..AnthropicRequest::default()
    };

    let ttl = match ctx.cache {
        Some(CacheHandle::Ephemeral { ttl_seconds }) => Some(cache_ttl(*ttl_seconds)),
        Some(CacheHandle::Named { name }) => {
            tracing::warn!(cache = %name, "named cache handles are not supported by Anthropic; ignoring");
            None
        }
        None => None,
    };

    // Tools are checked before turns, which may download media
    wire.tools = tools(request, &config)?;
    if wire.tools.is_some() {
        wire.tool_choice = request.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => AnthropicToolChoice::of("auto"),
            ToolChoice::Required => AnthropicToolChoice::of("any"),
            ToolChoice::None => AnthropicToolChoice::of("none"),
        });
    }

    wire.system = system_prompt(request, &config, ttl.as_deref())?;
    wire.messages = turns(request, ctx, ttl.as_deref()).await?;

    if let Some(output_format) = structured_output(request) {
        wire.output_format = Some(output_format);
    }

    wire.temperature = config.temperature;
    wire.top_p = config.top_p;
    wire.top_k = config.top_k;
    if !config.stop_sequences.is_empty() {
        wire.stop_sequences = Some(config.stop_sequences.clone());
    }
    wire.metadata = config.user_id.clone().map(|user_id| AnthropicMetadata { user_id: Some(user_id) });
    wire.service_tier.clone_from(&config.service_tier);
    wire.thinking = config.thinking.as_ref().map(|thinking| AnthropicThinking {
        thinking_type: if thinking.enabled { "enabled" } else { "disabled" }.to_owned(),
        budget_tokens: thinking.enabled.then_some(thinking.budget_tokens).flatten(),
    });
    if wire.output_format.is_none() {
        wire.output_format.clone_from(&config.output_format);
    }

    merge_passthrough(&mut wire.extra, &config.extra, RESERVED_KEYS);

    Ok(wire)
}

/// Whether the request needs the structured-outputs beta header
pub fn needs_structured_outputs_beta(request: &AnthropicRequest) -> bool {
    request.output_format.is_some()
}

fn check_exclusive(request: &GenerateRequest, config: &AnthropicConfig) -> Result<(), LlmError> {
    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest("request has no messages".to_owned()));
    }
    if config.system.is_some() && has_system_messages(&request.messages) {
        return Err(LlmError::Config(
            "config.system conflicts with system messages; use system-role messages instead".to_owned(),
        ));
    }
    if config.has_custom_tools() && !request.tools.is_empty() {
        return Err(LlmError::Config(
            "config.tools defines custom tools while the request has tools; use request tools instead".to_owned(),
        ));
    }
    if config.output_format.is_some() && request.output.as_ref().is_some_and(|output| output.constrained) {
        return Err(LlmError::Config(
            "config.output_format conflicts with constrained output; use the request output schema instead"
                .to_owned(),
        ));
    }
    if request.candidates.is_some_and(|n| n > 1) {
        return Err(LlmError::InvalidRequest(
            "Anthropic does not support multiple candidates".to_owned(),
        ));
    }
    Ok(())
}

fn cache_ttl(ttl_seconds: u64) -> String {
    if ttl_seconds >= 3600 { "1h" } else { "5m" }.to_owned()
}

fn system_prompt(
    request: &GenerateRequest,
    config: &AnthropicConfig,
    ttl: Option<&str>,
) -> Result<Option<AnthropicSystem>, LlmError> {
    if let Some(native) = &config.system {
        let system = serde_json::from_value(native.clone())
            .map_err(|e| LlmError::Config(format!("invalid config.system: {e}")))?;
        return Ok(Some(system));
    }

    let texts = system_texts(&request.messages)?;
    if texts.is_empty() {
        return Ok(None);
    }

    let mut blocks: Vec<_> = texts.into_iter().map(AnthropicContentBlock::text).collect();

    // Without any marker the handle came from the cache itself; the system
    // prompt is the prefix it covers
    let any_marked = request.messages.iter().any(|m| cache::marker_ttl(m).is_some());
    let system_marked = request
        .messages
        .iter()
        .any(|m| m.role == Role::System && cache::marker_ttl(m).is_some());
    if let Some(ttl) = ttl
        && (system_marked || !any_marked)
        && let Some(last) = blocks.last_mut()
    {
        last.set_cache_control(AnthropicCacheControl::ephemeral(Some(ttl.to_owned())));
    }

    Ok(Some(AnthropicSystem::Blocks(blocks)))
}

async fn turns(
    request: &GenerateRequest,
    ctx: &AssemblyContext<'_>,
    ttl: Option<&str>,
) -> Result<Vec<AnthropicMessage>, LlmError> {
    let mut turns = Vec::new();

    for message in request.messages.iter().filter(|m| m.role != Role::System) {
        if is_empty_turn(&message.content) {
            tracing::debug!(role = ?message.role, "skipping empty message");
            continue;
        }

        let mut content = parts::to_blocks(&message.content, ctx.media).await?;

        // The last block that can carry cache control closes the cached prefix
        if let Some(ttl) = ttl
            && cache::marker_ttl(message).is_some()
            && !content
                .iter_mut()
                .rev()
                .any(|block| block.set_cache_control(AnthropicCacheControl::ephemeral(Some(ttl.to_owned()))))
        {
            tracing::debug!(role = ?message.role, "marked message has no cacheable block");
        }

        // Tool results always open a new user turn
        let role = match message.role {
            Role::Model => "assistant",
            Role::User | Role::Tool | Role::System => "user",
        };

        turns.push(AnthropicMessage {
            role: role.to_owned(),
            content,
        });
    }

    if turns.is_empty() {
        return Err(LlmError::InvalidRequest(
            "request has no user or model messages".to_owned(),
        ));
    }

    Ok(turns)
}

/// `output_format` for constrained output, unless tools take precedence
fn structured_output(request: &GenerateRequest) -> Option<Value> {
    let output = request.output.as_ref()?;
    let schema = output.schema.as_ref()?;
    if !output.constrained {
        return None;
    }
    if !request.tools.is_empty() {
        tracing::debug!("tools present; not constraining output");
        return None;
    }
    Some(json!({"type": "json_schema", "schema": schema}))
}

fn tools(request: &GenerateRequest, config: &AnthropicConfig) -> Result<Option<Vec<AnthropicTool>>, LlmError> {
    validate_tool_names(&request.tools, &TOOL_NAME, TOOL_NAME_PATTERN)?;

    let mut tools: Vec<AnthropicTool> = request
        .tools
        .iter()
        .map(|tool| {
            AnthropicTool::Custom(AnthropicCustomTool {
                name: tool.name.clone(),
                description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                input_schema: tool
                    .input_schema
                    .clone()
                    .filter(|schema| schema.as_object().is_some_and(|s| !s.is_empty()))
                    .unwrap_or_else(|| json!({"type": "object"})),
                cache_control: None,
            })
        })
        .collect();

    if !config.tools.is_empty() {
        tracing::debug!(count = config.tools.len(), "appending native tools from config");
        tools.extend(config.tools.iter().cloned().map(AnthropicTool::Native));
    }

    Ok((!tools.is_empty()).then_some(tools))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::media::{MediaResolver, ResolvedMedia};
    use crate::types::{Media, Message, OutputSpec, Part, RequestConfig, ToolDefinition};

    struct NoMedia;

    #[async_trait]
    impl MediaResolver for NoMedia {
        async fn resolve(&self, media: &Media) -> Result<ResolvedMedia, LlmError> {
            Err(LlmError::MediaDownload {
                url: media.url.clone(),
                reason: "offline".to_owned(),
            })
        }
    }

    fn ctx<'a>(cache: Option<&'a CacheHandle>) -> AssemblyContext<'a> {
        AssemblyContext {
            model: "claude-sonnet-4-5",
            media: &NoMedia,
            cache,
            default_max_tokens: None,
        }
    }

    async fn build(request: &GenerateRequest) -> Result<AnthropicRequest, LlmError> {
        build_request(request, &ctx(None)).await
    }

    #[tokio::test]
    async fn basic_request_shape() {
        let request = GenerateRequest::new(vec![
            Message::system_text("Be terse."),
            Message::user_text("2+2?"),
        ]);
        let wire = build(&request).await.unwrap();

        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 4096,
                "system": [{"type": "text", "text": "Be terse."}],
                "messages": [{"role": "user", "content": [{"type": "text", "text": "2+2?"}]}]
            })
        );
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let err = build(&GenerateRequest::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn tool_role_becomes_user_turn() {
        let request = GenerateRequest::new(vec![
            Message::user_text("weather in Oslo?"),
            Message::new(
                Role::Model,
                vec![Part::tool_request("get_weather", json!({"city": "Oslo"}), Some("toolu_1".to_owned()))],
            ),
            Message::new(
                Role::Tool,
                vec![Part::tool_response("get_weather", json!("4C"), Some("toolu_1".to_owned()))],
            ),
        ]);
        let wire = build(&request).await.unwrap();

        let roles: Vec<_> = wire.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(wire.messages[2].content[0].block_type(), "tool_result");
    }

    #[tokio::test]
    async fn tools_and_choice_are_mapped() {
        let mut request = GenerateRequest::new(vec![Message::user_text("hi")]);
        request.tools = vec![ToolDefinition::new("lookup", "Look things up", None)];
        request.tool_choice = Some(ToolChoice::Required);
        request.config = RequestConfig::Raw(json!({
            "tools": [{"type": "web_search_20250305", "name": "web_search"}]
        }));

        let wire = serde_json::to_value(build(&request).await.unwrap()).unwrap();
        assert_eq!(
            wire["tools"],
            json!([
                {"name": "lookup", "description": "Look things up", "input_schema": {"type": "object"}},
                {"type": "web_search_20250305", "name": "web_search"}
            ])
        );
        assert_eq!(wire["tool_choice"], json!({"type": "any"}));
    }

    #[tokio::test]
    async fn invalid_tool_name_emits_no_tools() {
        let mut request = GenerateRequest::new(vec![Message::user_text("hi")]);
        request.tools = vec![
            ToolDefinition::new("fine", "", None),
            ToolDefinition::new("dotted.name", "", None),
        ];
        let err = build(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidToolName { ref name, .. } if name == "dotted.name"));

        request.tools = vec![ToolDefinition::new("x".repeat(65), "", None)];
        assert!(build(&request).await.is_err());

        request.tools = vec![ToolDefinition::new("", "", None)];
        assert!(build(&request).await.is_err());
    }

    #[tokio::test]
    async fn config_system_conflicts_with_system_messages() {
        let mut request = GenerateRequest::new(vec![Message::system_text("a"), Message::user_text("b")]);
        request.config = AnthropicConfig {
            system: Some(json!("native")),
            ..AnthropicConfig::default()
        }
        .into();
        let err = build(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(ref msg) if msg.contains("config.system")));
    }

    #[tokio::test]
    async fn output_format_conflicts_with_constrained_output() {
        let mut request = GenerateRequest::new(vec![Message::user_text("b")]);
        request.output = Some(OutputSpec {
            constrained: true,
            schema: Some(json!({"type": "object"})),
            ..OutputSpec::default()
        });
        request.config = RequestConfig::Raw(json!({"output_format": {"type": "json_schema", "schema": {}}}));
        let err = build(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(ref msg) if msg.contains("output_format")));
    }

    #[tokio::test]
    async fn constrained_output_sets_output_format() {
        let mut request = GenerateRequest::new(vec![Message::user_text("b")]);
        request.output = Some(OutputSpec {
            constrained: true,
            schema: Some(json!({"type": "object", "properties": {"a": {"type": "string"}}})),
            ..OutputSpec::default()
        });
        let wire = build(&request).await.unwrap();
        assert!(needs_structured_outputs_beta(&wire));
        assert_eq!(wire.output_format.unwrap()["type"], "json_schema");

        request.tools = vec![ToolDefinition::new("t", "", None)];
        let wire = build(&request).await.unwrap();
        assert!(wire.output_format.is_none());
    }

    #[tokio::test]
    async fn multiple_candidates_are_rejected() {
        let mut request = GenerateRequest::new(vec![Message::user_text("b")]);
        request.candidates = Some(2);
        assert!(matches!(build(&request).await, Err(LlmError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn passthrough_never_overrides_canonical_fields() {
        let mut request = GenerateRequest::new(vec![Message::user_text("b")]);
        request.config = RequestConfig::Raw(json!({
            "max_tokens": 10,
            "messages": [],
            "user_id": "u-7",
            "service_tier": "standard_only",
            "thinking": {"enabled": true, "budget_tokens": 1024},
            "container": "ctr_1"
        }));
        let wire = serde_json::to_value(build(&request).await.unwrap()).unwrap();

        assert_eq!(wire["max_tokens"], 10);
        assert_eq!(wire["messages"].as_array().unwrap().len(), 1);
        assert_eq!(wire["metadata"], json!({"user_id": "u-7"}));
        assert_eq!(wire["service_tier"], "standard_only");
        assert_eq!(wire["thinking"], json!({"type": "enabled", "budget_tokens": 1024}));
        assert_eq!(wire["container"], "ctr_1");
    }

    #[tokio::test]
    async fn cache_markers_set_cache_control() {
        let request = GenerateRequest::new(vec![
            Message::system_text("long preamble").with_metadata("cache", json!({"ttlSeconds": 3600})),
            Message::user_text("question"),
        ]);
        let handle = CacheHandle::Ephemeral { ttl_seconds: 3600 };
        let wire = serde_json::to_value(build_request(&request, &ctx(Some(&handle))).await.unwrap()).unwrap();

        assert_eq!(
            wire["system"],
            json!([{"type": "text", "text": "long preamble", "cache_control": {"type": "ephemeral", "ttl": "1h"}}])
        );
        assert!(wire["messages"][0]["content"][0].get("cache_control").is_none());
    }

    #[tokio::test]
    async fn media_failure_aborts_the_build() {
        let request = GenerateRequest::new(vec![Message::new(
            Role::User,
            vec![Part::text("describe"), Part::media("https://unreachable.example/cat.png", None)],
        )]);
        let err = build(&request).await.unwrap_err();
        assert!(err.to_string().contains("https://unreachable.example/cat.png"));
    }

    #[tokio::test]
    async fn tool_names_are_checked_before_media() {
        let mut request = GenerateRequest::new(vec![Message::new(
            Role::User,
            vec![Part::text("describe"), Part::media("https://unreachable.example/cat.png", None)],
        )]);
        request.tools = vec![ToolDefinition::new("bad/name", "", None)];

        let err = build(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::InvalidToolName { ref name, .. } if name == "bad/name"));
    }

    #[tokio::test]
    async fn foreign_config_is_rejected() {
        let mut request = GenerateRequest::new(vec![Message::user_text("b")]);
        request.config = crate::convert::google::GoogleConfig::default().into();
        assert!(matches!(build(&request).await, Err(LlmError::Config(_))));
    }
}
