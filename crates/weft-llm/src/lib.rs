//! Provider translation core for weft
//!
//! Maps a vendor-neutral generate request onto the Anthropic Messages API and
//! the Google GenAI (Google AI / Vertex AI) APIs and back. The pieces:
//!
//! - [`types`]: the canonical conversation, request, and response model
//! - [`convert`]: per-provider content-part conversion, request assembly,
//!   response normalization, and streaming folds
//! - [`schema`]: JSON Schema to Gemini schema translation
//! - [`stream`]: the provider-independent stream accumulator
//! - [`provider`]: HTTP clients driving the above
//! - [`state`]: a registry resolving `provider/model` names to providers

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod cache;
pub mod convert;
pub mod error;
pub mod media;
pub mod protocol;
pub mod provider;
pub mod routing;
pub mod schema;
pub mod state;
pub mod stream;
pub mod types;

pub use cache::{CacheHandle, ContextCache};
pub use error::LlmError;
pub use media::{DefaultMediaResolver, MediaResolver};
pub use provider::{Provider, ProviderCapabilities};
pub use state::LlmState;
pub use stream::StreamCallback;
pub use types::{GenerateChunk, GenerateRequest, GenerateResponse, Message, Part, Role};
