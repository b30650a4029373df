//! Scripted backend for tests
//!
//! Tokenizes one token per prompt byte, answers with a fixed reply and then the
//! end-of-generation token, and records everything the engine does to it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::inference::backend::{
    BackendError, ContextParams, DecodeContext, InferenceBackend, ModelHandle, ModelParams, Token,
};
use crate::inference::batch::{Batch, BatchSlot};

pub(crate) const BOS: Token = Token(1);
pub(crate) const EOG: Token = Token(2);

/// Prompt byte `b` tokenizes to `Token(BYTE_BASE + b)`
const BYTE_BASE: i32 = 16;
/// The i-th reply token is `Token(REPLY_BASE + i)`
const REPLY_BASE: i32 = 1000;
const VOCAB_SIZE: usize = 4096;

/// What the fake model does.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    /// Tokens produced in order, followed by EOG
    pub reply: Vec<Token>,
    pub pieces: HashMap<i32, Vec<u8>>,
    pub has_bos: bool,
    pub fail_init: bool,
    /// Number of load attempts that fail before loads succeed
    pub load_failures: usize,
    pub fail_context: bool,
    pub fail_tokenize: bool,
    /// 0-based prompt chunk whose decode fails
    pub fail_prompt_chunk: Option<usize>,
    /// 1-based generation step whose decode fails
    pub fail_generation_decode: Option<usize>,
}

impl Script {
    pub fn replying(words: &[&str]) -> Self {
        let reply: Vec<Token> = (0..words.len())
            .map(|i| Token(REPLY_BASE + i as i32))
            .collect();
        let pieces = reply
            .iter()
            .zip(words)
            .map(|(token, word)| (token.0, word.as_bytes().to_vec()))
            .collect();

        Self {
            reply,
            pieces,
            has_bos: true,
            fail_init: false,
            load_failures: 0,
            fail_context: false,
            fail_tokenize: false,
            fail_prompt_chunk: None,
            fail_generation_decode: None,
        }
    }
}

/// Shared counters observed by tests.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    pub inits: Arc<AtomicUsize>,
    pub loads: Arc<AtomicUsize>,
    pub contexts_opened: Arc<AtomicUsize>,
    pub live_contexts: Arc<AtomicUsize>,
    decodes: Arc<Mutex<Vec<Vec<BatchSlot>>>>,
    context_params: Arc<Mutex<Option<ContextParams>>>,
}

impl Recorder {
    /// Every batch submitted to any context, in order.
    pub fn decodes(&self) -> Vec<Vec<BatchSlot>> {
        self.decodes.lock().unwrap().clone()
    }

    pub fn last_context_params(&self) -> Option<ContextParams> {
        self.context_params.lock().unwrap().clone()
    }
}

pub(crate) struct FakeBackend {
    script: Script,
    recorder: Recorder,
}

impl FakeBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            recorder: Recorder::default(),
        }
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }
}

impl InferenceBackend for FakeBackend {
    type Model = FakeModel;

    fn init(&mut self) -> Result<(), BackendError> {
        self.recorder.inits.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_init {
            return Err(BackendError::new("backend init refused"));
        }
        Ok(())
    }

    fn load_model(&mut self, path: &Path, _params: &ModelParams) -> Result<FakeModel, BackendError> {
        if self.script.load_failures > 0 {
            self.script.load_failures -= 1;
            return Err(BackendError::new(format!(
                "cannot load {}",
                path.display()
            )));
        }
        self.recorder.loads.fetch_add(1, Ordering::SeqCst);
        Ok(FakeModel {
            script: self.script.clone(),
            recorder: self.recorder.clone(),
        })
    }
}

pub(crate) struct FakeModel {
    script: Script,
    recorder: Recorder,
}

impl ModelHandle for FakeModel {
    type Context<'m> = FakeContext<'m>;

    fn new_context(&self, params: &ContextParams) -> Result<FakeContext<'_>, BackendError> {
        *self.recorder.context_params.lock().unwrap() = Some(params.clone());
        if self.script.fail_context {
            return Err(BackendError::new("out of memory"));
        }
        self.recorder.contexts_opened.fetch_add(1, Ordering::SeqCst);
        self.recorder.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            model: self,
            prompt_chunks: 0,
            generation_steps: 0,
            prompt_done: false,
            logits: Vec::new(),
        })
    }

    fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<Token>, BackendError> {
        if self.script.fail_tokenize {
            return Err(BackendError::new("tokenizer rejected input"));
        }
        let mut tokens = Vec::with_capacity(text.len() + 1);
        if add_bos && self.script.has_bos {
            tokens.push(BOS);
        }
        tokens.extend(text.bytes().map(|b| Token(BYTE_BASE + b as i32)));
        Ok(tokens)
    }

    fn is_end_of_generation(&self, token: Token) -> bool {
        token == EOG
    }

    fn token_to_piece(&self, token: Token) -> Result<Vec<u8>, BackendError> {
        self.script
            .pieces
            .get(&token.0)
            .cloned()
            .ok_or_else(|| BackendError::new(format!("unknown token {}", token.0)))
    }
}

pub(crate) struct FakeContext<'m> {
    model: &'m FakeModel,
    prompt_chunks: usize,
    generation_steps: usize,
    prompt_done: bool,
    /// Logits per slot of the last decoded batch; `None` where not requested
    logits: Vec<Option<Vec<f32>>>,
}

impl FakeContext<'_> {
    fn one_hot(token: Token) -> Vec<f32> {
        let mut row = vec![0.0; VOCAB_SIZE];
        row[token.0 as usize] = 1.0;
        row
    }
}

impl DecodeContext for FakeContext<'_> {
    fn decode(&mut self, batch: &Batch) -> Result<(), BackendError> {
        let script = &self.model.script;
        self.model
            .recorder
            .decodes
            .lock()
            .unwrap()
            .push(batch.slots().to_vec());

        if self.prompt_done {
            self.generation_steps += 1;
            if script.fail_generation_decode == Some(self.generation_steps) {
                return Err(BackendError::new("kv cache full"));
            }
        } else {
            if script.fail_prompt_chunk == Some(self.prompt_chunks) {
                return Err(BackendError::new("prompt chunk rejected"));
            }
            self.prompt_chunks += 1;
        }

        let next = script
            .reply
            .get(self.generation_steps)
            .copied()
            .unwrap_or(EOG);
        self.logits = batch
            .slots()
            .iter()
            .map(|slot| slot.logits.then(|| Self::one_hot(next)))
            .collect();

        if batch.slots().iter().any(|slot| slot.logits) {
            self.prompt_done = true;
        }
        Ok(())
    }

    fn logits(&self, index: i32) -> &[f32] {
        self.logits
            .get(index as usize)
            .and_then(|row| row.as_deref())
            .unwrap_or_else(|| panic!("logits requested for slot {} without output", index))
    }
}

impl Drop for FakeContext<'_> {
    fn drop(&mut self) {
        self.model.recorder.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}
