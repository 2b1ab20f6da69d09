//! Content-part conversion for Google GenAI

use serde_json::{Value, json};
use url::Url;

use crate::error::LlmError;
use crate::media::MediaResolver;
use crate::protocol::google::{
    GoogleBlob, GoogleCodeExecutionResult, GoogleExecutableCode, GoogleFileData, GoogleFunctionCall,
    GoogleFunctionResponse, GooglePart,
};
use crate::types::{Extension, Media, Part, PartContent};

/// Hosts the API fetches itself; media there is passed by reference
const NATIVE_MEDIA_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "youtu.be",
    "generativelanguage.googleapis.com",
];

/// Key wrapping non-object tool output, since `response` must be an object
const OUTPUT_KEY: &str = "output";

/// Part metadata key holding unknown fields seen next to a known payload
pub const UNRECOGNIZED_KEY: &str = "unrecognized";

// -- Outbound: canonical parts to Google parts --

pub async fn to_google_parts(parts: &[Part], media: &dyn MediaResolver) -> Result<Vec<GooglePart>, LlmError> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        out.push(to_google_part(part, media).await?);
    }
    Ok(out)
}

/// Convert a single part
///
/// Signatures in part metadata are sent back as `thoughtSignature`.
pub async fn to_google_part(part: &Part, media: &dyn MediaResolver) -> Result<GooglePart, LlmError> {
    let signature = part.signature().map(str::to_owned);

    let mut out = match &part.content {
        PartContent::Text(text) => GooglePart::text(text.clone()),

        PartContent::Reasoning(text) => GooglePart {
            text: Some(text.clone()),
            thought: Some(true),
            ..GooglePart::default()
        },

        PartContent::Media(item) => media_part(item, media).await?,

        PartContent::ToolRequest { name, input, reference } => GooglePart {
            function_call: Some(GoogleFunctionCall {
                id: call_id(name, reference.as_deref()),
                name: name.clone(),
                args: if input.is_null() { json!({}) } else { input.clone() },
            }),
            ..GooglePart::default()
        },

        PartContent::ToolResponse {
            name,
            output,
            reference,
            content,
        } => {
            let mut parts = Vec::with_capacity(content.len());
            for aux in content {
                let PartContent::Media(item) = &aux.content else {
                    return Err(LlmError::Conversion(format!(
                        "Google tool responses may only carry media, found a {} part",
                        aux.kind()
                    )));
                };
                parts.push(media_part(item, media).await?);
            }
            GooglePart {
                function_response: Some(GoogleFunctionResponse {
                    id: call_id(name, reference.as_deref()),
                    name: name.clone(),
                    response: wrap_output(output),
                    parts,
                }),
                ..GooglePart::default()
            }
        }

        PartContent::Custom(extension) => extension_part(extension)?,
    };

    out.thought_signature = signature;
    Ok(out)
}

/// Call ids are only sent when they add information beyond the name
fn call_id(name: &str, reference: Option<&str>) -> Option<String> {
    reference.filter(|r| *r != name).map(str::to_owned)
}

fn wrap_output(output: &Value) -> Value {
    match output {
        Value::Object(_) => output.clone(),
        other => json!({ OUTPUT_KEY: other }),
    }
}

fn is_native_uri(url: &str) -> bool {
    if url.starts_with("gs://") {
        return true;
    }
    Url::parse(url).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| NATIVE_MEDIA_HOSTS.contains(&host))
    })
}

async fn media_part(item: &Media, media: &dyn MediaResolver) -> Result<GooglePart, LlmError> {
    if is_native_uri(&item.url) {
        return Ok(GooglePart {
            file_data: Some(GoogleFileData {
                mime_type: item.content_type.clone(),
                file_uri: item.url.clone(),
            }),
            ..GooglePart::default()
        });
    }

    let resolved = media.resolve(item).await?;
    Ok(GooglePart {
        inline_data: Some(GoogleBlob {
            data: resolved.base64(),
            mime_type: resolved.content_type,
        }),
        ..GooglePart::default()
    })
}

fn extension_part(extension: &Extension) -> Result<GooglePart, LlmError> {
    match extension {
        Extension::ExecutableCode { language, code } => Ok(GooglePart {
            executable_code: Some(GoogleExecutableCode {
                language: language.clone(),
                code: code.clone(),
            }),
            ..GooglePart::default()
        }),
        Extension::CodeExecutionResult { outcome, output } => Ok(GooglePart {
            code_execution_result: Some(GoogleCodeExecutionResult {
                outcome: outcome.clone(),
                output: (!output.is_empty()).then(|| output.clone()),
            }),
            ..GooglePart::default()
        }),
        Extension::Unrecognized {
            raw: Value::Object(fields),
            ..
        } => Ok(GooglePart {
            extra: fields.clone(),
            ..GooglePart::default()
        }),
        other => Err(LlmError::Conversion(format!(
            "{} content cannot be sent to Google",
            other.kind()
        ))),
    }
}

// -- Inbound: Google parts to canonical parts --

/// Convert a response part
///
/// Unknown fields beside a known payload are kept in metadata under
/// [`UNRECOGNIZED_KEY`].
///
/// # Errors
///
/// A part with more than one payload field set violates the API contract;
/// debug builds assert, release builds return `LlmError::Conversion`.
pub fn to_part(part: &GooglePart) -> Result<Part, LlmError> {
    let payloads = part.payload_count();
    if payloads > 1 {
        debug_assert!(payloads <= 1, "Google part has {payloads} payload fields: {part:?}");
        return Err(LlmError::Conversion(format!(
            "Google part has {payloads} payload fields set"
        )));
    }

    let signature = part.thought_signature.clone().filter(|s| !s.is_empty());

    let converted = if let Some(text) = &part.text {
        if part.is_thought() {
            Part::reasoning(text.clone(), None)
        } else {
            Part::text(text.clone())
        }
    } else if let Some(blob) = &part.inline_data {
        Part::media(
            format!("data:{};base64,{}", blob.mime_type, blob.data),
            Some(blob.mime_type.as_str()),
        )
    } else if let Some(file) = &part.file_data {
        Part::media(file.file_uri.clone(), file.mime_type.as_deref())
    } else if let Some(call) = &part.function_call {
        Part::tool_request(
            call.name.clone(),
            call.args.clone(),
            Some(call.id.clone().unwrap_or_else(|| call.name.clone())),
        )
    } else if let Some(response) = &part.function_response {
        function_response_part(response)?
    } else if let Some(code) = &part.executable_code {
        Part::custom(Extension::ExecutableCode {
            language: code.language.clone(),
            code: code.code.clone(),
        })
    } else if let Some(result) = &part.code_execution_result {
        Part::custom(Extension::CodeExecutionResult {
            outcome: result.outcome.clone(),
            output: result.output.clone().unwrap_or_default(),
        })
    } else if let Some(kind) = part.extra.keys().next() {
        tracing::warn!(field = %kind, "unrecognized Google part");
        return Ok(Part::custom(Extension::Unrecognized {
            kind: kind.clone(),
            raw: Value::Object(part.extra.clone()),
        })
        .with_signature(signature));
    } else if signature.is_some() {
        // A bare signature closes a thought that produced no text
        Part::reasoning(String::new(), None)
    } else {
        Part::text(String::new())
    };

    let mut converted = converted.with_signature(signature);
    if !part.extra.is_empty() {
        let fields: Vec<&str> = part.extra.keys().map(String::as_str).collect();
        tracing::warn!(?fields, "unrecognized fields on Google part");
        converted
            .metadata
            .insert(UNRECOGNIZED_KEY.to_owned(), Value::Object(part.extra.clone()));
    }
    Ok(converted)
}

fn function_response_part(response: &GoogleFunctionResponse) -> Result<Part, LlmError> {
    let output = match &response.response {
        Value::Object(fields) if fields.len() == 1 && fields.contains_key(OUTPUT_KEY) => {
            fields.get(OUTPUT_KEY).cloned().unwrap_or_default()
        }
        other => other.clone(),
    };

    let mut content = Vec::with_capacity(response.parts.len());
    for aux in &response.parts {
        content.push(to_part(aux)?);
    }

    Ok(Part::from(PartContent::ToolResponse {
        name: response.name.clone(),
        output,
        reference: Some(response.id.clone().unwrap_or_else(|| response.name.clone())),
        content,
    }))
}
