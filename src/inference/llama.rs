//! llama.cpp backend
//!
//! Binds the backend traits to `llama-cpp-2`. llama.cpp may only be
//! initialized once per process, so the `LlamaBackend` lives in a process-wide
//! cell and every `LlamaCppBackend` borrows it.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::OnceLock;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;

use crate::inference::backend::{
    BackendError, ContextParams, DecodeContext, InferenceBackend, ModelHandle, ModelParams, Token,
};
use crate::inference::batch::Batch;

static LLAMA_BACKEND: OnceLock<Result<LlamaBackend, String>> = OnceLock::new();

fn shared_backend() -> Result<&'static LlamaBackend, BackendError> {
    let result = LLAMA_BACKEND.get_or_init(|| LlamaBackend::init().map_err(|e| e.to_string()));
    match result {
        Ok(backend) => Ok(backend),
        Err(e) => Err(BackendError::new(format!(
            "Failed to initialize llama.cpp backend: {}",
            e
        ))),
    }
}

#[derive(Default)]
pub struct LlamaCppBackend {
    backend: Option<&'static LlamaBackend>,
}

impl LlamaCppBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InferenceBackend for LlamaCppBackend {
    type Model = LlamaCppModel;

    fn init(&mut self) -> Result<(), BackendError> {
        self.backend = Some(shared_backend()?);
        tracing::info!("LlamaBackend initialized");
        Ok(())
    }

    fn load_model(
        &mut self,
        path: &Path,
        params: &ModelParams,
    ) -> Result<LlamaCppModel, BackendError> {
        let backend = self
            .backend
            .ok_or_else(|| BackendError::new("Backend not initialized"))?;

        let model_params = LlamaModelParams::default().with_n_gpu_layers(params.gpu_layers);
        let model = LlamaModel::load_from_file(backend, path, &model_params)
            .map_err(|e| BackendError::new(e.to_string()))?;

        tracing::info!(
            "Model info: {} params, {} vocab, {} training ctx",
            model.n_params(),
            model.n_vocab(),
            model.n_ctx_train()
        );

        Ok(LlamaCppModel { backend, model })
    }
}

pub struct LlamaCppModel {
    backend: &'static LlamaBackend,
    model: LlamaModel,
}

impl ModelHandle for LlamaCppModel {
    type Context<'m> = LlamaCppContext<'m>;

    fn new_context(&self, params: &ContextParams) -> Result<LlamaCppContext<'_>, BackendError> {
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(params.n_ctx))
            .with_n_batch(params.n_batch)
            .with_n_threads(params.n_threads)
            .with_n_threads_batch(params.n_threads_batch);

        let ctx = self
            .model
            .new_context(self.backend, ctx_params)
            .map_err(|e| BackendError::new(e.to_string()))?;

        // Sized for the largest prompt chunk; generation steps use one slot.
        let native = LlamaBatch::new(params.n_batch as usize, 1);

        Ok(LlamaCppContext { ctx, native })
    }

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>, BackendError> {
        let add_bos = if add_bos {
            AddBos::Always
        } else {
            AddBos::Never
        };
        let tokens = self
            .model
            .str_to_token(text, add_bos)
            .map_err(|e| BackendError::new(e.to_string()))?;
        Ok(tokens.into_iter().map(|t| Token(t.0)).collect())
    }

    fn is_end_of_generation(&self, token: Token) -> bool {
        self.model.is_eog_token(LlamaToken(token.0))
    }

    fn token_to_piece(&self, token: Token) -> Result<Vec<u8>, BackendError> {
        self.model
            .token_to_bytes(LlamaToken(token.0), Special::Tokenize)
            .map_err(|e| BackendError::new(e.to_string()))
    }
}

/// A decoding context plus the native batch it reuses for every decode.
pub struct LlamaCppContext<'m> {
    ctx: LlamaContext<'m>,
    native: LlamaBatch<'static>,
}

impl DecodeContext for LlamaCppContext<'_> {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        if batch.is_empty() {
            return Err(BackendError::new("Cannot decode an empty batch"));
        }

        self.native.clear();
        for slot in batch.slots() {
            self.native
                .add(LlamaToken(slot.token.0), slot.pos, &slot.seq_ids, slot.logits)
                .map_err(|e| BackendError::new(format!("Failed to add token to batch: {}", e)))?;
        }

        self.ctx
            .decode(&mut self.native)
            .map_err(|e| BackendError::new(e.to_string()))
    }

    fn logits(&self, index: i32) -> &[f32] {
        self.ctx.get_logits_ith(index)
    }
}
