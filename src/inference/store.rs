//! Model residency
//!
//! Holds the one loaded model. The store goes from empty to loaded at most
//! once; there is no unload and no reload with a different path.

use std::path::{Path, PathBuf};

use crate::inference::backend::{InferenceBackend, ModelParams};
use crate::inference::engine::EngineError;
use crate::inference::model::validate_gguf;

/// What a call to [`ModelStore::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model was loaded by this call
    Loaded,
    /// A model was already resident; nothing changed
    AlreadyLoaded,
}

pub struct ModelStore<B: InferenceBackend> {
    backend: B,
    /// Set once `backend.init()` has succeeded. A failed model load does not
    /// reset it, so a retry never initializes the backend twice.
    backend_ready: bool,
    model: Option<B::Model>,
    model_path: Option<PathBuf>,
}

impl<B: InferenceBackend> ModelStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            backend_ready: false,
            model: None,
            model_path: None,
        }
    }

    pub fn load(&mut self, path: &Path, params: &ModelParams) -> Result<LoadOutcome, EngineError> {
        if self.model.is_some() {
            tracing::info!("Model already loaded, ignoring {}", path.display());
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        tracing::info!("Loading model from: {}", path.display());
        let header = validate_gguf(path)?;
        tracing::debug!(
            "GGUF v{} header: {} tensors, {} metadata entries",
            header.version,
            header.tensor_count,
            header.metadata_kv_count
        );

        if !self.backend_ready {
            self.backend.init().map_err(|e| {
                tracing::error!("Failed to init backend: {}", e);
                EngineError::BackendInit(e.to_string())
            })?;
            self.backend_ready = true;
            tracing::info!("Backend initialized");
        }

        let model = self.backend.load_model(path, params).map_err(|e| {
            tracing::error!("Failed to load model from path {}: {}", path.display(), e);
            EngineError::ModelLoad(e.to_string())
        })?;

        self.model = Some(model);
        self.model_path = Some(path.to_path_buf());
        tracing::info!("Model loaded successfully.");
        Ok(LoadOutcome::Loaded)
    }

    pub fn model(&self) -> Option<&B::Model> {
        self.model.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn loaded_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }
}
