//! String-typed boundary for hosts that cannot carry a `Result`
//!
//! Foreign callers (JNI, C, scripting hosts) historically received a bare
//! `bool` from load and a single string from inference, with failures encoded
//! as fixed sentinel strings. These helpers map the typed API onto that
//! convention; nothing inside the crate depends on them.

use std::path::Path;

use crate::inference::backend::InferenceBackend;
use crate::inference::engine::{Engine, InferenceError};
use crate::inference::streaming::TokenSink;

pub const MODEL_NOT_INITIALIZED: &str = "Error: Model not initialized";
pub const CONTEXT_CREATION_FAILED: &str = "Error: Failed to create context";
pub const TOKENIZATION_FAILED: &str = "Error: Tokenization failed";
pub const DECODE_FAILED: &str = "Error: Decode failed";

impl InferenceError {
    /// Fixed sentinel string for this failure kind.
    pub fn sentinel(&self) -> &'static str {
        match self {
            InferenceError::ModelNotInitialized => MODEL_NOT_INITIALIZED,
            InferenceError::ContextCreation(_) => CONTEXT_CREATION_FAILED,
            InferenceError::Tokenization(_) => TOKENIZATION_FAILED,
            InferenceError::PromptDecode(_) => DECODE_FAILED,
        }
    }
}

/// `true` when a model is resident after the call.
pub fn load_model_flag<B: InferenceBackend>(engine: &Engine<B>, path: &Path) -> bool {
    match engine.load_model(path) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Model load failed: {}", e);
            false
        }
    }
}

/// The generated text, or a sentinel string on failure.
pub fn infer_or_sentinel<B: InferenceBackend>(
    engine: &Engine<B>,
    prompt: &str,
    sink: Option<&mut dyn TokenSink>,
) -> String {
    engine
        .infer(prompt, sink)
        .unwrap_or_else(|e| e.sentinel().to_string())
}
