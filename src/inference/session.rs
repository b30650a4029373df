//! Per-request inference pipeline
//!
//! An [`InferenceSession`] owns one decoding context, one reusable batch and a
//! greedy sampler. It tokenizes the prompt, feeds it through the context in
//! fixed-size chunks, then generates one token at a time until the model emits
//! an end-of-generation token or the token budget runs out.
//!
//! Everything the session owns is released when it is dropped, which happens
//! on every return path of [`InferenceSession::run`].

use crate::config::EngineConfig;
use crate::inference::backend::{DecodeContext, ModelHandle, Token};
use crate::inference::batch::Batch;
use crate::inference::engine::InferenceError;
use crate::inference::sampler::GreedySampler;
use crate::inference::streaming::{clamp_piece, FragmentDecoder, TokenSink};

/// Every token belongs to the single sequence of the session.
const SEQ_ID: [i32; 1] = [0];

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced its end-of-generation token
    EndOfGeneration,
    /// `max_new_tokens` tokens were generated
    TokenBudget,
    /// Decoding a generated token failed; the text so far is kept
    DecodeFailure,
}

/// Result of a successful (possibly partial) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Concatenation of every fragment handed to the sink
    pub text: String,
    /// Prompt length in tokens, including the BOS marker
    pub prompt_tokens: usize,
    /// Tokens sampled, not counting the end-of-generation token
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
}

pub struct InferenceSession<'m, M: ModelHandle + 'm> {
    model: &'m M,
    ctx: M::Context<'m>,
    batch: Batch,
    sampler: GreedySampler,
    /// Next position to decode
    n_past: i32,
    context_size: usize,
    max_new_tokens: usize,
    piece_capacity: usize,
}

impl<'m, M: ModelHandle + 'm> InferenceSession<'m, M> {
    /// Creates a fresh context for one request.
    pub fn open(model: &'m M, config: &EngineConfig) -> Result<Self, InferenceError> {
        let params = config.context_params();

        let ctx = model.new_context(&params).map_err(|e| {
            tracing::error!("Failed to create context: {}", e);
            InferenceError::ContextCreation(e.to_string())
        })?;

        let batch = Batch::new(config.prompt_chunk_size as usize)
            .map_err(|e| InferenceError::ContextCreation(e.to_string()))?;

        tracing::debug!(
            "Session opened (n_ctx {}, chunk {}, threads {}/{})",
            params.n_ctx,
            batch.capacity(),
            params.n_threads,
            params.n_threads_batch
        );

        Ok(Self {
            model,
            ctx,
            batch,
            sampler: GreedySampler::new(),
            n_past: 0,
            context_size: config.context_size as usize,
            max_new_tokens: config.max_new_tokens as usize,
            piece_capacity: config.token_piece_capacity as usize,
        })
    }

    /// Runs the whole request. Fragments reach `sink` as they are produced.
    ///
    /// Prompt-phase failures return an error and nothing is emitted. A decode
    /// failure during generation ends the request early with the text so far.
    pub fn run(
        mut self,
        prompt: &str,
        sink: Option<&mut dyn TokenSink>,
    ) -> Result<Completion, InferenceError> {
        let tokens = self.tokenize(prompt)?;
        self.decode_prompt(&tokens)?;
        Ok(self.generate(tokens.len(), sink))
    }

    fn tokenize(&self, prompt: &str) -> Result<Vec<Token>, InferenceError> {
        let tokens = self
            .model
            .tokenize(prompt, true)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;

        if tokens.is_empty() {
            return Err(InferenceError::Tokenization(
                "prompt produced no tokens".to_string(),
            ));
        }
        if tokens.len() > self.context_size {
            return Err(InferenceError::Tokenization(format!(
                "prompt needs {} tokens but the context window holds {}",
                tokens.len(),
                self.context_size
            )));
        }

        tracing::debug!("Tokenized prompt into {} tokens", tokens.len());
        Ok(tokens)
    }

    /// Feeds the prompt through the context in batch-sized chunks. Only the
    /// final prompt token asks for logits.
    fn decode_prompt(&mut self, tokens: &[Token]) -> Result<(), InferenceError> {
        let last = tokens.len() - 1;

        for (chunk_index, chunk) in tokens.chunks(self.batch.capacity()).enumerate() {
            self.batch.clear();
            for &token in chunk {
                let is_last = self.n_past as usize == last;
                self.batch
                    .add(token, self.n_past, &SEQ_ID, is_last)
                    .map_err(|e| InferenceError::PromptDecode(e.to_string()))?;
                self.n_past += 1;
            }

            self.ctx.decode(&self.batch).map_err(|e| {
                tracing::error!("Prompt decode failed on chunk {}: {}", chunk_index, e);
                InferenceError::PromptDecode(format!("chunk {}: {}", chunk_index, e))
            })?;

            tracing::trace!(
                "Decoded prompt chunk {} ({} tokens, n_past {})",
                chunk_index,
                chunk.len(),
                self.n_past
            );
        }

        Ok(())
    }

    fn generate(&mut self, prompt_tokens: usize, mut sink: Option<&mut dyn TokenSink>) -> Completion {
        let mut text = String::new();
        let mut decoder = FragmentDecoder::new();
        let mut generated = 0usize;
        let mut stop_reason = StopReason::TokenBudget;

        while generated < self.max_new_tokens {
            let next = self.sampler.sample(&self.ctx, self.batch.n_tokens() - 1);

            if self.model.is_end_of_generation(next) {
                tracing::debug!("End of generation token encountered");
                stop_reason = StopReason::EndOfGeneration;
                break;
            }
            generated += 1;

            let piece = match self.model.token_to_piece(next) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to convert token {} to text: {}", next.0, e);
                    Vec::new()
                }
            };
            if let Some(fragment) = decoder.push(clamp_piece(&piece, self.piece_capacity)) {
                emit(&mut text, &mut sink, fragment);
            }

            self.batch.clear();
            let step = self
                .batch
                .add(next, self.n_past, &SEQ_ID, true)
                .map_err(|e| e.to_string())
                .and_then(|_| self.ctx.decode(&self.batch).map_err(|e| e.to_string()));
            if let Err(e) = step {
                tracing::warn!(
                    "Decode failed at position {}, returning partial output: {}",
                    self.n_past,
                    e
                );
                stop_reason = StopReason::DecodeFailure;
                break;
            }
            self.n_past += 1;
        }

        if decoder.has_pending() {
            tracing::debug!("Generation ended inside a multi-byte character, flushing lossily");
        }
        if let Some(rest) = decoder.finish() {
            emit(&mut text, &mut sink, rest);
        }

        tracing::debug!(
            "Generation stopped after {} tokens ({:?})",
            generated,
            stop_reason
        );

        Completion {
            text,
            prompt_tokens,
            generated_tokens: generated,
            stop_reason,
        }
    }
}

impl<'m, M: ModelHandle + 'm> Drop for InferenceSession<'m, M> {
    fn drop(&mut self) {
        tracing::trace!("Session released at position {}", self.n_past);
    }
}

fn emit(text: &mut String, sink: &mut Option<&mut dyn TokenSink>, fragment: String) {
    text.push_str(&fragment);
    if let Some(sink) = sink.as_deref_mut() {
        sink.on_token(&fragment);
    }
}
