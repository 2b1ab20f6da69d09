//! Google GenAI provider: the Gemini API and Vertex AI
//!
//! Both backends speak the same `generateContent` protocol and differ only
//! in endpoint layout and authentication.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;
use weft_config::{ProviderConfig, ProviderType};
use weft_core::RequestContext;

use super::{Provider, ProviderCapabilities, cancellable, decode, send, sse_events};
use crate::cache::{CACHE_METADATA_KEY, ContextCache};
use crate::convert::AssemblyContext;
use crate::convert::google::{GoogleStreamFold, build_request, normalize};
use crate::error::LlmError;
use crate::media::MediaResolver;
use crate::protocol::google::{GoogleErrorResponse, GoogleResponse};
use crate::stream::{StreamCallback, accumulate};
use crate::types::{GenerateRequest, GenerateResponse};

/// Default Gemini API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Where requests go and how they authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    /// Gemini API, `x-goog-api-key`
    GoogleAi,
    /// Vertex AI, bearer token
    Vertex { project: String, location: String },
}

/// Google GenAI provider
pub struct GoogleProvider {
    name: String,
    client: Client,
    base_url: Url,
    backend: Backend,
    api_key: Option<SecretString>,
    default_max_tokens: Option<u32>,
    media: Arc<dyn MediaResolver>,
    cache: Option<Arc<dyn ContextCache>>,
}

impl GoogleProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the provider is not a Google type or the
    /// derived base URL is invalid.
    pub fn new(name: String, config: &ProviderConfig, media: Arc<dyn MediaResolver>) -> Result<Self, LlmError> {
        let backend = match &config.provider_type {
            ProviderType::GoogleAi => Backend::GoogleAi,
            ProviderType::VertexAi(vertex) => Backend::Vertex {
                project: vertex.project.clone(),
                location: vertex.location.clone(),
            },
            ProviderType::Anthropic => {
                return Err(LlmError::Config(format!("provider '{name}' is not a Google provider")));
            }
        };

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(&default_base_url(&backend))
                .map_err(|e| LlmError::Config(format!("invalid base URL for provider '{name}': {e}")))?,
        };

        Ok(Self {
            name,
            client: Client::new(),
            base_url,
            backend,
            api_key: config.api_key.clone(),
            default_max_tokens: config.default_max_tokens,
            media,
            cache: None,
        })
    }

    /// Install a context cache producing named `cachedContent` handles
    #[must_use]
    pub fn with_cache(mut self, cache: Option<Arc<dyn ContextCache>>) -> Self {
        self.cache = cache;
        self
    }

    /// Resolve the API key from request context or config
    fn resolve_api_key(&self, context: &RequestContext) -> Option<String> {
        context
            .api_key
            .as_ref()
            .or(self.api_key.as_ref())
            .map(|key| key.expose_secret().to_owned())
    }

    /// Endpoint for `method` (`generateContent` or `streamGenerateContent`)
    fn endpoint(&self, model: &str, method: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        match &self.backend {
            Backend::GoogleAi => format!("{base}/models/{model}:{method}"),
            Backend::Vertex { project, location } => format!(
                "{base}/projects/{project}/locations/{location}/publishers/google/models/{model}:{method}"
            ),
        }
    }
}

fn default_base_url(backend: &Backend) -> String {
    match backend {
        Backend::GoogleAi => DEFAULT_BASE_URL.to_owned(),
        Backend::Vertex { location, .. } if location == "global" => "https://aiplatform.googleapis.com/v1".to_owned(),
        Backend::Vertex { location, .. } => format!("https://{location}-aiplatform.googleapis.com/v1"),
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GoogleErrorResponse>(body).ok().map(|response| {
        if response.error.status.is_empty() {
            response.error.message
        } else {
            format!("{}: {}", response.error.status, response.error.message)
        }
    })
}

/// Mid-stream failures arrive as an error object instead of a chunk
fn parse_chunk(data: &str) -> Result<GoogleResponse, LlmError> {
    if let Ok(response) = serde_json::from_str::<GoogleErrorResponse>(data) {
        let status = http::StatusCode::from_u16(response.error.code).ok();
        return Err(LlmError::upstream("google", status, response.error.message));
    }
    serde_json::from_str(data).map_err(|e| LlmError::Streaming(format!("invalid Google chunk: {e}")))
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            media: true,
            system_role: true,
        }
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        model: &str,
        context: &RequestContext,
        callback: Option<&mut StreamCallback<'_>>,
    ) -> Result<GenerateResponse, LlmError> {
        // Cache preparation and media downloads are part of the call
        let (handle, wire) = cancellable(&context.cancellation, async {
            let handle = match &self.cache {
                Some(cache) => cache.prepare(request, model).await?,
                None => None,
            };
            let assembly = AssemblyContext {
                model,
                media: self.media.as_ref(),
                cache: handle.as_ref(),
                default_max_tokens: self.default_max_tokens,
            };
            let wire = build_request(request, &assembly).await?;
            Ok::<_, LlmError>((handle, wire))
        })
        .await?;

        let url = if callback.is_some() {
            format!("{}?alt=sse", self.endpoint(model, "streamGenerateContent"))
        } else {
            self.endpoint(model, "generateContent")
        };

        let mut builder = self.client.post(&url).json(&wire);
        if let Some(key) = self.resolve_api_key(context) {
            builder = match self.backend {
                Backend::GoogleAi => builder.header("x-goog-api-key", key),
                Backend::Vertex { .. } => builder.bearer_auth(key),
            };
        }

        tracing::debug!(provider = %self.name, model = %model, url = %url, "sending generateContent request");

        let mut response = match callback {
            None => {
                let body: GoogleResponse = cancellable(&context.cancellation, async {
                    let response = send(builder, &self.name, error_message).await?;
                    decode(response, &self.name).await
                })
                .await?;
                normalize(&body)?
            }
            Some(callback) => {
                let response = cancellable(&context.cancellation, send(builder, &self.name, error_message)).await?;
                let events = sse_events(response, parse_chunk);
                accumulate(GoogleStreamFold::new(), events, callback, &context.cancellation).await?
            }
        };

        if let Some(handle) = &handle {
            response.annotate(CACHE_METADATA_KEY, handle.annotation());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_config::Config;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::media::DefaultMediaResolver;
    use crate::types::Message;

    fn provider(toml: &str) -> GoogleProvider {
        let config = Config::parse(toml).unwrap();
        let (name, provider_config) = config.llm.providers.first().unwrap();
        let media = Arc::new(DefaultMediaResolver::new(&config.llm.media));
        GoogleProvider::new(name.clone(), provider_config, media).unwrap()
    }

    #[test]
    fn vertex_endpoint_layout() {
        let vertex = provider(
            r#"
            [llm.providers.vertex.type.vertex_ai]
            project = "proj-1"
            location = "europe-west4"
            "#,
        );
        assert_eq!(
            vertex.endpoint("gemini-2.5-pro", "generateContent"),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/proj-1/locations/europe-west4/publishers/google/models/gemini-2.5-pro:generateContent"
        );

        let global = provider(
            r#"
            [llm.providers.vertex.type.vertex_ai]
            project = "proj-1"
            location = "global"
            "#,
        );
        assert!(global.endpoint("m", "generateContent").starts_with("https://aiplatform.googleapis.com/v1/"));
    }

    #[tokio::test]
    async fn google_ai_sends_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "4"}]}, "finishReason": "STOP"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gemini = provider(&format!(
            r#"
            [llm.providers.gemini]
            type = "google_ai"
            api_key = "g-key"
            base_url = "{}/v1beta"
            "#,
            server.uri()
        ));
        let request = GenerateRequest::new(vec![Message::user_text("2+2?")]);
        let response = gemini
            .generate(&request, "gemini-2.5-flash", &RequestContext::empty(), None)
            .await
            .unwrap();
        assert_eq!(response.text(), "4");
    }

    #[tokio::test]
    async fn streaming_uses_sse_endpoint() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lo\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let gemini = provider(&format!(
            r#"
            [llm.providers.gemini]
            type = "google_ai"
            base_url = "{}/v1beta"
            "#,
            server.uri()
        ));
        let mut deltas = Vec::new();
        let mut callback = |chunk: crate::types::GenerateChunk| -> anyhow::Result<()> {
            deltas.push(chunk.text());
            Ok(())
        };
        let request = GenerateRequest::new(vec![Message::user_text("hi")]);
        let response = gemini
            .generate(&request, "gemini-2.5-flash", &RequestContext::empty(), Some(&mut callback))
            .await
            .unwrap();

        assert_eq!(deltas, ["Hel", "lo"]);
        assert_eq!(response.text(), "Hello");
    }

    #[test]
    fn error_objects_in_stream_are_upstream_errors() {
        let err = parse_chunk(r#"{"error": {"code": 503, "message": "overloaded", "status": "UNAVAILABLE"}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Upstream { status: Some(s), .. } if s.as_u16() == 503));
    }
}
