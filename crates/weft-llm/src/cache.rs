//! Context cache collaborator seam
//!
//! A cache implementation decides, per request and model, whether part of the
//! prompt is cached. Request assembly only attaches the handle it returns;
//! key hashing, TTL bookkeeping, and cache creation live behind the trait.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::LlmError;
use crate::types::{GenerateRequest, Message};

/// Message metadata key marking a cache boundary
pub const CACHE_METADATA_KEY: &str = "cache";

/// Default TTL for marker-based ephemeral caching
const DEFAULT_TTL_SECONDS: u64 = 300;

/// Opaque reference to cached prompt content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheHandle {
    /// A named cached-content resource (Gemini `cachedContent`)
    Named { name: String },
    /// Provider-managed ephemeral caching (Anthropic `cache_control`)
    Ephemeral { ttl_seconds: u64 },
}

impl CacheHandle {
    /// The value recorded under `custom.cache` on the response
    pub fn annotation(&self) -> Value {
        match self {
            Self::Named { name } => json!({ "name": name }),
            Self::Ephemeral { ttl_seconds } => json!({ "ttlSeconds": ttl_seconds }),
        }
    }
}

/// Produces a cache handle for a request, if any of it should be cached
#[async_trait]
pub trait ContextCache: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the cache backend fails; the generate call
    /// fails with it.
    async fn prepare(&self, request: &GenerateRequest, model: &str) -> Result<Option<CacheHandle>, LlmError>;
}

/// Ephemeral caching driven by `cache` markers in message metadata
///
/// A message whose metadata has `"cache": true` or
/// `"cache": {"ttlSeconds": N}` marks a cache boundary. The largest TTL among
/// the marked messages is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCacheMarkers;

#[async_trait]
impl ContextCache for MessageCacheMarkers {
    async fn prepare(&self, request: &GenerateRequest, model: &str) -> Result<Option<CacheHandle>, LlmError> {
        let ttl = request.messages.iter().filter_map(marker_ttl).max();
        if let Some(ttl_seconds) = ttl {
            tracing::debug!(model = %model, ttl_seconds, "prompt cache markers present");
        }
        Ok(ttl.map(|ttl_seconds| CacheHandle::Ephemeral { ttl_seconds }))
    }
}

/// TTL requested by a message's cache marker, if it has one
pub fn marker_ttl(message: &Message) -> Option<u64> {
    match message.metadata.get(CACHE_METADATA_KEY)? {
        Value::Bool(true) => Some(DEFAULT_TTL_SECONDS),
        Value::Object(options) => Some(
            options
                .get("ttlSeconds")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_TTL_SECONDS),
        ),
        _ => None,
    }
}
