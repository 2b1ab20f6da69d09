//! Provider trait and HTTP implementations

pub mod anthropic;
pub mod google;

use std::future::Future;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::{RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use weft_core::RequestContext;

use crate::error::LlmError;
use crate::stream::StreamCallback;
use crate::types::{GenerateRequest, GenerateResponse};

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider supports tool/function calling
    pub tool_calling: bool,
    /// Whether media parts are accepted
    pub media: bool,
    /// Whether system-role messages are accepted
    pub system_role: bool,
}

/// Trait implemented by each LLM provider backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configured provider name
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Run one generate call against `model`
    ///
    /// With a callback the call streams, delivering each chunk of new parts
    /// as it arrives; without one it blocks for the complete response. Both
    /// paths return the same normalized response.
    async fn generate(
        &self,
        request: &GenerateRequest,
        model: &str,
        context: &RequestContext,
        callback: Option<&mut StreamCallback<'_>>,
    ) -> Result<GenerateResponse, LlmError>;
}

/// Run `future` unless the call is cancelled first
pub(crate) async fn cancellable<T>(
    cancellation: &CancellationToken,
    future: impl Future<Output = Result<T, LlmError>>,
) -> Result<T, LlmError> {
    tokio::select! {
        biased;
        () = cancellation.cancelled() => Err(LlmError::Cancelled),
        result = future => result,
    }
}

/// Send a request and turn non-2xx answers into `LlmError::Upstream`
///
/// `error_message` extracts the provider's message from an error body.
pub(crate) async fn send(
    builder: RequestBuilder,
    provider: &str,
    error_message: fn(&str) -> Option<String>,
) -> Result<Response, LlmError> {
    let response = builder.send().await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "upstream request failed");
        LlmError::Transport {
            context: format!("request to {provider} failed"),
            source: e,
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider = %provider, status = %status, "upstream returned error");
    let message = error_message(&body).unwrap_or(body);
    Err(LlmError::upstream(provider, Some(status), message))
}

/// Decode a successful JSON body
pub(crate) async fn decode<T: serde::de::DeserializeOwned>(response: Response, provider: &str) -> Result<T, LlmError> {
    response.json().await.map_err(|e| LlmError::Transport {
        context: format!("failed to decode {provider} response"),
        source: e,
    })
}

/// Server-sent events of a streaming response, parsed with `parse`
///
/// Events with empty data are skipped. Transport and parse failures are
/// stream errors; no event after a failure is trusted.
pub(crate) fn sse_events<E>(
    response: Response,
    parse: fn(&str) -> Result<E, LlmError>,
) -> impl Stream<Item = Result<E, LlmError>> + Send
where
    E: Send + 'static,
{
    response.bytes_stream().eventsource().filter_map(move |result| {
        let item = match result {
            Ok(event) => {
                let data = event.data.trim();
                (!data.is_empty()).then(|| parse(data))
            }
            Err(e) => Some(Err(LlmError::Streaming(e.to_string()))),
        };
        async move { item }
    })
}
