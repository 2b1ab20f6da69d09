//! Anthropic Messages API provider implementation

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;
use weft_config::ProviderConfig;
use weft_core::RequestContext;

use super::{Provider, ProviderCapabilities, cancellable, decode, send, sse_events};
use crate::cache::{CACHE_METADATA_KEY, ContextCache, MessageCacheMarkers};
use crate::convert::AssemblyContext;
use crate::convert::anthropic::{AnthropicStreamFold, build_request, needs_structured_outputs_beta, normalize};
use crate::error::LlmError;
use crate::media::MediaResolver;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicResponse, AnthropicStreamEvent};
use crate::stream::{StreamCallback, accumulate};
use crate::types::{GenerateRequest, GenerateResponse};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag required for `output_format`
const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_max_tokens: Option<u32>,
    media: Arc<dyn MediaResolver>,
    cache: Option<Arc<dyn ContextCache>>,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// Prompt caching follows `cache` markers in message metadata unless
    /// another cache is installed with [`AnthropicProvider::with_cache`].
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the default base URL cannot be parsed.
    pub fn new(name: String, config: &ProviderConfig, media: Arc<dyn MediaResolver>) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Config(format!("invalid base URL: {e}")))?,
        };

        Ok(Self {
            name,
            client: Client::new(),
            base_url,
            api_key: config.api_key.clone(),
            default_max_tokens: config.default_max_tokens,
            media,
            cache: Some(Arc::new(MessageCacheMarkers)),
        })
    }

    /// Replace the context cache; `None` disables prompt caching
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

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<AnthropicErrorResponse>(body)
        .ok()
        .map(|response| format!("{}: {}", response.error.error_type, response.error.message))
}

fn parse_event(data: &str) -> Result<AnthropicStreamEvent, LlmError> {
    serde_json::from_str(data).map_err(|e| LlmError::Streaming(format!("invalid Anthropic event: {e}")))
}

#[async_trait]
impl Provider for AnthropicProvider {
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
        let (handle, mut wire) = cancellable(&context.cancellation, async {
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
        wire.stream = callback.is_some().then_some(true);

        let mut builder = self
            .client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire);
        if needs_structured_outputs_beta(&wire) {
            builder = builder.header("anthropic-beta", STRUCTURED_OUTPUTS_BETA);
        }
        if let Some(key) = self.resolve_api_key(context) {
            builder = builder.header("x-api-key", key);
        }

        tracing::debug!(provider = %self.name, model = %model, stream = wire.stream.is_some(), "sending messages request");

        let mut response = match callback {
            None => {
                let body: AnthropicResponse = cancellable(&context.cancellation, async {
                    let response = send(builder, &self.name, error_message).await?;
                    decode(response, &self.name).await
                })
                .await?;
                normalize(&body)?
            }
            Some(callback) => {
                let response = cancellable(&context.cancellation, send(builder, &self.name, error_message)).await?;
                let events = sse_events(response, parse_event);
                accumulate(AnthropicStreamFold::new(), events, callback, &context.cancellation).await?
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::media::DefaultMediaResolver;
    use crate::types::{FinishReason, Message};

    fn provider(server: &MockServer) -> AnthropicProvider {
        let config = Config::parse(&format!(
            r#"
            [llm.providers.claude]
            type = "anthropic"
            api_key = "sk-test"
            base_url = "{}/v1"
            "#,
            server.uri()
        ))
        .unwrap();
        let provider_config = &config.llm.providers["claude"];
        let media = Arc::new(DefaultMediaResolver::new(&config.llm.media));
        AnthropicProvider::new("claude".to_owned(), provider_config, media).unwrap()
    }

    #[tokio::test]
    async fn blocking_call_sends_auth_and_version_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "4"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 3, "output_tokens": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![Message::user_text("2+2?")]);
        let response = provider(&server)
            .generate(&request, "claude-sonnet-4-5", &RequestContext::empty(), None)
            .await
            .unwrap();

        assert_eq!(response.text(), "4");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn upstream_error_keeps_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "type": "error",
                "error": {"type": "rate_limit_error", "message": "slow down"}
            })))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![Message::user_text("hi")]);
        let err = provider(&server)
            .generate(&request, "claude-sonnet-4-5", &RequestContext::empty(), None)
            .await
            .unwrap_err();

        let LlmError::Upstream { status, message, .. } = &err else {
            panic!("expected upstream error, got {err:?}");
        };
        assert_eq!(status.map(|s| s.as_u16()), Some(429));
        assert_eq!(message, "rate_limit_error: slow down");
    }

    #[tokio::test]
    async fn cache_markers_are_annotated_on_the_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "ok"}],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let request = GenerateRequest::new(vec![
            Message::system_text("preamble").with_metadata("cache", json!(true)),
            Message::user_text("hi"),
        ]);
        let response = provider(&server)
            .generate(&request, "claude-sonnet-4-5", &RequestContext::empty(), None)
            .await
            .unwrap();
        assert_eq!(response.custom["cache"], json!({"ttlSeconds": 300}));

        let sent: serde_json::Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
        assert_eq!(sent["system"][0]["cache_control"], json!({"type": "ephemeral", "ttl": "5m"}));
    }
}
