//! Shared primitives for the weft provider adapters
//!
//! Holds the pieces every provider crate needs but none of them owns: the
//! boundary error classification trait and the per-call request context.

#![allow(clippy::must_use_candidate)]

mod context;
mod error;

pub use context::RequestContext;
pub use error::HttpError;
