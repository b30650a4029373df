//! Inference engine
//!
//! [`Engine`] is the single entry point the host talks to. It owns the
//! [`ModelStore`] behind one exclusive lock, and every load and every
//! inference request holds that lock for its whole duration. At most one
//! [`InferenceSession`] therefore exists at any instant, and two requests never
//! interleave their sink calls.
//!
//! The engine is an ordinary value: the composition root builds one, wraps it
//! in an `Arc` when several threads need it, and passes it around.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::config::EngineConfig;
use crate::inference::backend::InferenceBackend;
use crate::inference::model::ModelError;
use crate::inference::session::{Completion, InferenceSession};
use crate::inference::store::{LoadOutcome, ModelStore};
use crate::inference::streaming::TokenSink;

/// Errors that can occur while loading a model
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("Failed to initialize backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Model validation failed: {0}")]
    ModelValidation(String),
}

impl From<ModelError> for EngineError {
    fn from(e: ModelError) -> Self {
        EngineError::ModelValidation(e.to_string())
    }
}

/// Errors that end an inference request before any text is produced
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Model not initialized")]
    ModelNotInitialized,

    #[error("Failed to create context: {0}")]
    ContextCreation(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Prompt decode failed: {0}")]
    PromptDecode(String),
}

pub struct Engine<B: InferenceBackend> {
    store: Mutex<ModelStore<B>>,
    config: EngineConfig,
}

impl<B: InferenceBackend> Engine<B> {
    /// Creates an engine with no model resident. `config` is fixed for the
    /// engine's lifetime.
    pub fn new(backend: B, mut config: EngineConfig) -> Self {
        config.validate();
        tracing::info!(
            "Engine created (n_ctx {}, chunk {}, max {} tokens)",
            config.context_size,
            config.prompt_chunk_size,
            config.max_new_tokens
        );
        Self {
            store: Mutex::new(ModelStore::new(backend)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loads the model unless one is already resident.
    ///
    /// A second call is a no-op returning [`LoadOutcome::AlreadyLoaded`],
    /// whatever path it is given.
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadOutcome, EngineError> {
        let mut store = self.lock_store();
        store.load(path.as_ref(), &self.config.model_params())
    }

    pub fn is_model_loaded(&self) -> bool {
        self.lock_store().is_loaded()
    }

    pub fn loaded_model_path(&self) -> Option<PathBuf> {
        self.lock_store().loaded_path().map(Path::to_path_buf)
    }

    /// Runs one request, streaming fragments to `sink` as they are produced.
    ///
    /// Blocks until any other load or request has finished.
    pub fn generate(
        &self,
        prompt: &str,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<Completion, InferenceError> {
        let store = self.lock_store();
        let model = store.model().ok_or(InferenceError::ModelNotInitialized)?;

        let session = InferenceSession::open(model, &self.config)?;
        let completion = session.run(prompt, sink)?;

        tracing::info!(
            "Generated {} tokens from a {} token prompt ({:?})",
            completion.generated_tokens,
            completion.prompt_tokens,
            completion.stop_reason
        );
        Ok(completion)
    }

    /// Like [`Engine::generate`] but returns only the text.
    pub fn infer(
        &self,
        prompt: &str,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<String, InferenceError> {
        self.generate(prompt, sink).map(|completion| completion.text)
    }

    fn lock_store(&self) -> MutexGuard<'_, ModelStore<B>> {
        self.store.lock().unwrap_or_else(|poisoned| {
            // A sink panicked mid-request; the session was dropped while
            // unwinding, so the store itself is intact.
            tracing::warn!("Recovered engine lock after a panicked request");
            poisoned.into_inner()
        })
    }
}
