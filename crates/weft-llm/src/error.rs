use http::StatusCode;
use thiserror::Error;
use weft_core::HttpError;

/// Errors that can occur while translating or executing a generate call
#[derive(Debug, Error)]
pub enum LlmError {
    /// The canonical request is malformed or violates a provider constraint
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A tool name does not satisfy the provider's naming rule
    #[error("invalid tool name `{name}`: must match {pattern}")]
    InvalidToolName { name: String, pattern: &'static str },

    /// A JSON Schema could not be translated for the provider
    #[error("unsupported schema: {0}")]
    Schema(String),

    /// A content part cannot be represented by the provider
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The request config is of the wrong kind or conflicts with the request
    #[error("invalid config: {0}")]
    Config(String),

    /// Remote media could not be fetched
    #[error("failed to download media from {url}: {reason}")]
    MediaDownload { url: String, reason: String },

    /// The provider answered with an error
    #[error("{provider} returned {}: {message}", status.map_or_else(|| "an error".to_owned(), |s| s.to_string()))]
    Upstream {
        provider: String,
        status: Option<StatusCode>,
        message: String,
    },

    /// The HTTP exchange with the provider failed
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response stream was malformed or ended early
    #[error("streaming error: {0}")]
    Streaming(String),

    /// The streaming callback rejected a chunk
    #[error(transparent)]
    Callback(anyhow::Error),

    /// The caller cancelled the call
    #[error("request cancelled")]
    Cancelled,

    /// Requested model was not found in any configured provider
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Named provider does not exist in configuration
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the failure happened before anything was sent to the provider
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::InvalidToolName { .. }
                | Self::Schema(_)
                | Self::Conversion(_)
                | Self::Config(_)
                | Self::MediaDownload { .. }
        )
    }

    pub(crate) fn upstream(provider: &str, status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.to_owned(),
            status,
            message: message.into(),
        }
    }
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotFound { .. } | Self::ProviderNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_)
            | Self::InvalidToolName { .. }
            | Self::Schema(_)
            | Self::Conversion(_)
            | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::MediaDownload { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream { status, .. } => match status {
                Some(s) if s.is_client_error() => *s,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::Cancelled => StatusCode::REQUEST_TIMEOUT,
            Self::Streaming(_) | Self::Callback(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::ModelNotFound { .. } | Self::ProviderNotFound { .. } => "not_found_error",
            Self::InvalidRequest(_) | Self::InvalidToolName { .. } | Self::Schema(_) | Self::Conversion(_) => {
                "invalid_request_error"
            }
            Self::Config(_) => "config_error",
            Self::MediaDownload { .. } => "media_error",
            Self::Upstream { .. } | Self::Transport { .. } => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::Callback(_) => "callback_error",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }
}
