//! Backend seam
//!
//! The session logic is written against these traits so the llama.cpp binding
//! and the scripted test backend are interchangeable.

use std::path::Path;

use thiserror::Error;

use crate::inference::batch::Batch;

/// Vocabulary token id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub i32);

/// Failure reported by a backend operation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        BackendError(message.into())
    }
}

/// Parameters used when loading weights.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    /// Number of layers to offload to GPU (0 = CPU only)
    pub gpu_layers: u32,
}

/// Parameters for a per-request decoding context.
#[derive(Debug, Clone)]
pub struct ContextParams {
    /// Context window in tokens
    pub n_ctx: u32,
    /// Maximum tokens submitted in one decode call
    pub n_batch: u32,
    /// Threads used while generating
    pub n_threads: i32,
    /// Threads used while processing the prompt
    pub n_threads_batch: i32,
}

/// Entry point of a computation library: one-time init and model loading.
pub trait InferenceBackend: Send {
    type Model: ModelHandle + Send;

    /// Process-wide initialization. Called at most once per backend instance.
    fn init(&mut self) -> Result<(), BackendError>;

    fn load_model(&mut self, path: &Path, params: &ModelParams)
        -> Result<Self::Model, BackendError>;
}

/// Loaded weights and vocabulary.
pub trait ModelHandle {
    type Context<'m>: DecodeContext
    where
        Self: 'm;

    fn new_context(&self, params: &ContextParams) -> Result<Self::Context<'_>, BackendError>;

    /// Tokenize `text`, prepending the beginning-of-sequence marker when `add_bos` is set.
    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>, BackendError>;

    fn is_end_of_generation(&self, token: Token) -> bool;

    /// Raw bytes of the token's text piece. May be empty.
    fn token_to_piece(&self, token: Token) -> Result<Vec<u8>, BackendError>;
}

/// Per-request decoding state (KV cache and logits).
pub trait DecodeContext {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError>;

    /// Logits of the batch slot at `index` from the last decode. The slot must
    /// have requested logits.
    fn logits(&self, index: i32) -> &[f32];
}
