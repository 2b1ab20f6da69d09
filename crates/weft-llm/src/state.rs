//! Provider registry and dispatch

use std::collections::HashMap;
use std::sync::Arc;

use weft_config::{LlmConfig, ProviderType};
use weft_core::RequestContext;

use crate::error::LlmError;
use crate::media::{DefaultMediaResolver, MediaResolver};
use crate::provider::Provider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::routing::ModelRouter;
use crate::stream::StreamCallback;
use crate::types::{GenerateRequest, GenerateResponse};

/// Configured providers plus the router that picks between them
///
/// Cheap to clone; all clones share the same providers.
#[derive(Clone)]
pub struct LlmState {
    inner: Arc<LlmStateInner>,
}

struct LlmStateInner {
    router: ModelRouter,
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl LlmState {
    /// Build the registry from configuration, constructing every provider
    ///
    /// All providers share one media resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if a model pattern is invalid or a provider fails to
    /// initialize.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let media: Arc<dyn MediaResolver> = Arc::new(DefaultMediaResolver::new(&config.media));
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match &provider_config.provider_type {
                ProviderType::Anthropic => Arc::new(AnthropicProvider::new(
                    name.clone(),
                    provider_config,
                    Arc::clone(&media),
                )?),
                ProviderType::GoogleAi | ProviderType::VertexAi(_) => Arc::new(GoogleProvider::new(
                    name.clone(),
                    provider_config,
                    Arc::clone(&media),
                )?),
            };

            tracing::debug!(provider = %name, "registered provider");
            providers.insert(name.clone(), provider);
        }

        Ok(Self::new(ModelRouter::new(config)?, providers))
    }

    /// Assemble from an existing router and provider set
    pub fn new(router: ModelRouter, providers: HashMap<String, Arc<dyn Provider>>) -> Self {
        Self {
            inner: Arc::new(LlmStateInner { router, providers }),
        }
    }

    /// Look up a provider by configured name
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner.providers.get(name).cloned()
    }

    /// Resolve `model` and return the provider with the provider-local model id
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ProviderNotFound` or `LlmError::ModelNotFound` if
    /// the name does not resolve.
    pub fn resolve(&self, model: &str) -> Result<(Arc<dyn Provider>, String), LlmError> {
        let resolved = self.inner.router.resolve(model)?;
        let provider = self
            .provider(&resolved.provider_name)
            .ok_or_else(|| LlmError::ProviderNotFound {
                provider: resolved.provider_name.clone(),
            })?;
        Ok((provider, resolved.model_id))
    }

    /// Run one generate call against the provider serving `model`
    ///
    /// With a callback the call streams; see [`Provider::generate`].
    ///
    /// # Errors
    ///
    /// Returns resolution errors, or whatever the provider call returns.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        model: &str,
        context: &RequestContext,
        callback: Option<&mut StreamCallback<'_>>,
    ) -> Result<GenerateResponse, LlmError> {
        let (provider, model_id) = self.resolve(model)?;
        tracing::debug!(provider = %provider.name(), model = %model_id, stream = callback.is_some(), "dispatching generate");

        let result = provider.generate(request, &model_id, context, callback).await;
        if let Err(e) = &result {
            tracing::debug!(provider = %provider.name(), model = %model_id, error = %e, "generate failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::Message;

    fn state(server: &MockServer) -> LlmState {
        let config = Config::parse(&format!(
            r#"
            [llm.providers.claude]
            type = "anthropic"
            base_url = "{uri}/anthropic"
            models.include = ["^claude-"]

            [llm.providers.gemini]
            type = "google_ai"
            base_url = "{uri}/google"
            "#,
            uri = server.uri()
        ))
        .unwrap();
        LlmState::from_config(&config.llm).unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_resolved_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/google/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "from gemini"}]}, "finishReason": "STOP"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/anthropic/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "from claude"}],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let state = state(&server);
        let request = GenerateRequest::new(vec![Message::user_text("hi")]);

        let gemini = state
            .generate(&request, "gemini-2.5-flash", &RequestContext::empty(), None)
            .await
            .unwrap();
        assert_eq!(gemini.text(), "from gemini");

        let claude = state
            .generate(&request, "claude/claude-sonnet-4-5", &RequestContext::empty(), None)
            .await
            .unwrap();
        assert_eq!(claude.text(), "from claude");
    }

    #[tokio::test]
    async fn unknown_provider_fails_before_any_request() {
        let server = MockServer::start().await;
        let state = state(&server);
        let request = GenerateRequest::new(vec![Message::user_text("hi")]);

        let err = state
            .generate(&request, "openai/gpt-4o", &RequestContext::empty(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ProviderNotFound { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn providers_are_registered_by_name() {
        let config = Config::parse(
            r#"
            [llm.providers.vertex.type.vertex_ai]
            project = "p"
            location = "us-central1"
            "#,
        )
        .unwrap();
        let state = LlmState::from_config(&config.llm).unwrap();
        assert_eq!(state.provider("vertex").unwrap().name(), "vertex");
        assert!(state.provider("claude").is_none());
    }
}
