//! Canonical, provider-neutral types for generate calls
//!
//! Every provider converts to and from these. Nothing in here knows about
//! a wire format.

pub mod extension;
pub mod message;
pub mod part;
pub mod request;
pub mod response;
pub mod tool;

pub use extension::Extension;
pub use message::{Message, Metadata, Role};
pub use part::{Media, Part, PartContent, SIGNATURE_KEY};
pub use request::{GenerateRequest, GenerationCommonConfig, OutputSpec, RequestConfig};
pub use response::{FinishReason, GenerateChunk, GenerateResponse, Usage};
pub use tool::{ToolChoice, ToolDefinition};
