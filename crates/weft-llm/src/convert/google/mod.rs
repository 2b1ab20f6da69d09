//! Google GenAI (Gemini API and Vertex AI) conversion

mod config;
pub mod parts;
pub mod response;
pub mod stream;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

pub use config::GoogleConfig;
pub use response::normalize;
pub use stream::GoogleStreamFold;

use super::{AssemblyContext, has_system_messages, is_empty_turn, merge_passthrough, system_texts, validate_tool_names};
use crate::cache::CacheHandle;
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleContent, GoogleFunctionCallingConfig, GoogleFunctionDeclaration, GoogleGenerationConfig, GooglePart,
    GoogleRequest, GoogleSchema, GoogleTool, GoogleToolConfig,
};
use crate::schema::to_google_schema;
use crate::types::{GenerateRequest, Role, ToolChoice};

/// Gemini function names
pub const TOOL_NAME_PATTERN: &str = r"^[a-zA-Z_][a-zA-Z0-9_.-]{0,63}$";

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(TOOL_NAME_PATTERN).expect("must be valid regex"));

const JSON_MIME_TYPE: &str = "application/json";
const ENUM_MIME_TYPE: &str = "text/x.enum";

/// Request fields set by assembly; raw config never overrides them
const RESERVED_KEYS: &[&str] = &[
    "contents",
    "systemInstruction",
    "generationConfig",
    "tools",
    "toolConfig",
    "safetySettings",
    "cachedContent",
    "labels",
];

/// Untyped raw config keys that belong inside `generationConfig`
const GENERATION_KEYS: &[&str] = &[
    "mediaResolution",
    "responseLogprobs",
    "logprobs",
    "responseJsonSchema",
    "speechConfig",
    "audioTimestamp",
    "imageConfig",
    "routingConfig",
    "modelSelectionConfig",
    "enableAffectiveDialog",
    "enableEnhancedCivicAnswers",
];

/// Build a `generateContent` request from a canonical request
///
/// Every check runs before message content is converted, so a rejected
/// request never triggers a media download.
///
/// # Errors
///
/// Fails before any network call on config coercion errors, conflicting
/// canonical and native fields, invalid tool names, untranslatable schemas,
/// or parts Gemini cannot represent.
pub async fn build_request(request: &GenerateRequest, ctx: &AssemblyContext<'_>) -> Result<GoogleRequest, LlmError> {
    let config = GoogleConfig::coerce(&request.config)?;
    check_exclusive(request, &config)?;

    let tools = tools(request, &config)?;
    let tool_config = tool_config(request, &config, tools.is_some())?;

    let mut generation = generation_config(request, &config);
    generation.max_output_tokens = generation.max_output_tokens.or(ctx.default_max_tokens);
    apply_output(request, &config, &mut generation)?;

    let system_instruction = system_instruction(request, &config)?;

    let mut wire = GoogleRequest {
        system_instruction,
        contents: contents(request, ctx).await?,
        generation_config: (generation != GoogleGenerationConfig::default()).then_some(generation),
        tools,
        tool_config,
        ..GoogleRequest::default()
    };

    wire.safety_settings.clone_from(&config.safety_settings);
    wire.labels.clone_from(&config.labels);
    wire.cached_content.clone_from(&config.cached_content);

    let passthrough: Map<String, Value> = config
        .extra
        .iter()
        .filter(|(key, _)| !GENERATION_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    merge_passthrough(&mut wire.extra, &passthrough, RESERVED_KEYS);

    match ctx.cache {
        Some(CacheHandle::Named { name }) => {
            tracing::debug!(cache = %name, "attaching cached content");
            wire.cached_content = Some(name.clone());
        }
        Some(CacheHandle::Ephemeral { ttl_seconds }) => {
            tracing::debug!(ttl_seconds, "Gemini caches prompts implicitly; ignoring ephemeral cache handle");
        }
        None => {}
    }

    Ok(wire)
}

fn check_exclusive(request: &GenerateRequest, config: &GoogleConfig) -> Result<(), LlmError> {
    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest("request has no messages".to_owned()));
    }
    if config.system_instruction.is_some() && has_system_messages(&request.messages) {
        return Err(LlmError::Config(
            "config.systemInstruction conflicts with system messages; use system-role messages instead".to_owned(),
        ));
    }
    if config.has_function_declarations() && !request.tools.is_empty() {
        return Err(LlmError::Config(
            "config.tools declares functions while the request has tools; use request tools instead".to_owned(),
        ));
    }
    if config.response_schema.is_some() && request.output.as_ref().is_some_and(|output| output.constrained) {
        return Err(LlmError::Config(
            "config.responseSchema conflicts with constrained output; use the request output schema instead"
                .to_owned(),
        ));
    }
    if config.candidate_count.is_some() && request.candidates.is_some() {
        return Err(LlmError::Config(
            "config.candidateCount conflicts with the request candidate count; use the request field instead"
                .to_owned(),
        ));
    }
    Ok(())
}

fn system_instruction(request: &GenerateRequest, config: &GoogleConfig) -> Result<Option<GoogleContent>, LlmError> {
    match &config.system_instruction {
        Some(Value::String(text)) => {
            return Ok(Some(GoogleContent {
                role: None,
                parts: vec![GooglePart::text(text.clone())],
            }));
        }
        Some(native) => {
            let content = serde_json::from_value(native.clone())
                .map_err(|e| LlmError::Config(format!("invalid config.systemInstruction: {e}")))?;
            return Ok(Some(content));
        }
        None => {}
    }

    let texts = system_texts(&request.messages)?;
    if texts.is_empty() {
        return Ok(None);
    }
    Ok(Some(GoogleContent {
        role: None,
        parts: texts.into_iter().map(GooglePart::text).collect(),
    }))
}

async fn contents(request: &GenerateRequest, ctx: &AssemblyContext<'_>) -> Result<Vec<GoogleContent>, LlmError> {
    let mut contents = Vec::new();

    for message in request.messages.iter().filter(|m| m.role != Role::System) {
        if is_empty_turn(&message.content) {
            tracing::debug!(role = ?message.role, "skipping empty message");
            continue;
        }

        // Function responses travel in a user turn of their own
        let role = match message.role {
            Role::Model => "model",
            Role::User | Role::Tool | Role::System => "user",
        };

        contents.push(GoogleContent {
            role: Some(role.to_owned()),
            parts: parts::to_google_parts(&message.content, ctx.media).await?,
        });
    }

    if contents.is_empty() {
        return Err(LlmError::InvalidRequest(
            "request has no user or model messages".to_owned(),
        ));
    }

    Ok(contents)
}

fn generation_config(request: &GenerateRequest, config: &GoogleConfig) -> GoogleGenerationConfig {
    GoogleGenerationConfig {
        temperature: config.temperature,
        top_p: config.top_p,
        top_k: config.top_k,
        max_output_tokens: config.max_output_tokens,
        stop_sequences: (!config.stop_sequences.is_empty()).then(|| config.stop_sequences.clone()),
        candidate_count: request.candidates.or(config.candidate_count),
        seed: config.seed,
        presence_penalty: config.presence_penalty,
        frequency_penalty: config.frequency_penalty,
        response_mime_type: config.response_mime_type.clone(),
        response_schema: None,
        response_modalities: config.response_modalities.clone(),
        thinking_config: config.thinking_config.clone(),
        extra: config
            .extra
            .iter()
            .filter(|(key, _)| GENERATION_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    }
}

/// Structured output, unless tools take precedence
fn apply_output(
    request: &GenerateRequest,
    config: &GoogleConfig,
    generation: &mut GoogleGenerationConfig,
) -> Result<(), LlmError> {
    if let Some(native) = &config.response_schema {
        let schema: GoogleSchema = serde_json::from_value(native.clone())
            .map_err(|e| LlmError::Config(format!("invalid config.responseSchema: {e}")))?;
        generation.response_schema = Some(schema);
    }

    let Some(output) = request.output.as_ref() else {
        return Ok(());
    };
    let is_enum = output.format.as_deref() == Some("enum");
    if !is_enum && !request.wants_json() {
        return Ok(());
    }
    if !request.tools.is_empty() {
        tracing::debug!("tools present; not constraining output");
        return Ok(());
    }

    generation.response_mime_type = Some(if is_enum { ENUM_MIME_TYPE } else { JSON_MIME_TYPE }.to_owned());
    if let Some(schema) = &output.schema {
        generation.response_schema = to_google_schema(schema)?;
    }
    Ok(())
}

fn tools(request: &GenerateRequest, config: &GoogleConfig) -> Result<Option<Vec<GoogleTool>>, LlmError> {
    validate_tool_names(&request.tools, &TOOL_NAME, TOOL_NAME_PATTERN)?;

    let mut declarations = Vec::with_capacity(request.tools.len());
    for tool in &request.tools {
        let parameters = match &tool.input_schema {
            Some(schema) => to_google_schema(schema).map_err(|e| match e {
                LlmError::Schema(reason) => LlmError::Schema(format!("tool `{}`: {reason}", tool.name)),
                other => other,
            })?,
            None => None,
        };
        declarations.push(GoogleFunctionDeclaration {
            name: tool.name.clone(),
            description: (!tool.description.is_empty()).then(|| tool.description.clone()),
            parameters,
        });
    }

    let mut native = Vec::with_capacity(config.tools.len());
    for raw in &config.tools {
        let mut tool: GoogleTool = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::Config(format!("invalid entry in config.tools: {e}")))?;
        if let Some(more) = tool.function_declarations.take() {
            declarations.extend(more);
        }
        if !tool.extra.is_empty() {
            native.push(tool);
        }
    }

    // Gemini rejects more than one functionDeclarations block
    let mut tools = Vec::with_capacity(native.len() + 1);
    if !declarations.is_empty() {
        tools.push(GoogleTool {
            function_declarations: Some(declarations),
            ..GoogleTool::default()
        });
    }
    if !native.is_empty() {
        tracing::debug!(count = native.len(), "appending native tools from config");
        tools.extend(native);
    }

    Ok((!tools.is_empty()).then_some(tools))
}

fn tool_config(
    request: &GenerateRequest,
    config: &GoogleConfig,
    has_tools: bool,
) -> Result<Option<GoogleToolConfig>, LlmError> {
    let mut tool_config = match &config.tool_config {
        Some(native) => serde_json::from_value(native.clone())
            .map_err(|e| LlmError::Config(format!("invalid config.toolConfig: {e}")))?,
        None => GoogleToolConfig::default(),
    };

    if has_tools && let Some(choice) = request.tool_choice {
        let (mode, allowed): (&str, Option<Vec<String>>) = match choice {
            ToolChoice::Auto => ("AUTO", None),
            ToolChoice::Required => (
                "ANY",
                Some(request.tools.iter().map(|tool| tool.name.clone()).collect()),
            ),
            ToolChoice::None => ("NONE", None),
        };
        tool_config.function_calling_config = Some(GoogleFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names: allowed.filter(|names| !names.is_empty()),
        });
    }

    Ok((tool_config != GoogleToolConfig::default()).then_some(tool_config))
}
