//! LLM inference engine
//!
//! Model residency, the per-request session pipeline, and the lock that
//! serializes them.

pub mod backend;
pub mod batch;
pub mod bridge;
pub mod engine;
#[cfg(feature = "llamacpp")]
pub mod llama;
pub mod model;
pub mod prompt;
pub mod sampler;
pub mod session;
pub mod store;
pub mod streaming;

#[cfg(test)]
pub(crate) mod fake;

// Re-export main types for convenience
pub use backend::{BackendError, DecodeContext, InferenceBackend, ModelHandle, Token};
pub use engine::{Engine, EngineError, InferenceError};
#[cfg(feature = "llamacpp")]
pub use llama::LlamaCppBackend;
pub use model::{validate_gguf, GgufHeader, ModelError, GGUF_MAGIC};
pub use session::{Completion, StopReason};
pub use store::LoadOutcome;
pub use streaming::{stream_to_channel, StreamToken, TokenSink};
