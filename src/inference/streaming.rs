//! Streaming inference support
//!
//! Handles token-by-token delivery of generated text to the caller.

use std::io::Write;
use std::sync::mpsc::{Receiver, Sender};

use crate::inference::backend::InferenceBackend;
use crate::inference::engine::{Engine, InferenceError};
use crate::inference::session::Completion;
use crate::truncate_str;

/// Receives generated text fragments, one call per fragment, in generation order.
///
/// Calls happen synchronously on the thread running the inference, while the
/// engine lock is held.
pub trait TokenSink {
    fn on_token(&mut self, fragment: &str);
}

impl<F> TokenSink for F
where
    F: FnMut(&str),
{
    fn on_token(&mut self, fragment: &str) {
        self(fragment)
    }
}

/// Represents an event emitted during streaming inference.
#[derive(Debug, Clone)]
pub enum StreamToken {
    /// A generated text fragment
    Token(String),
    /// Generation completed (possibly early)
    Done(Completion),
    /// The request failed before generation started
    Error(InferenceError),
}

impl StreamToken {
    /// Returns true if this ends the stream
    pub fn is_done(&self) -> bool {
        matches!(self, StreamToken::Done(_))
    }

    /// Returns true if this is an Error variant
    pub fn is_error(&self) -> bool {
        matches!(self, StreamToken::Error(_))
    }

    /// Extracts the text if this is a Token variant
    pub fn as_token(&self) -> Option<&str> {
        match self {
            StreamToken::Token(s) => Some(s),
            _ => None,
        }
    }
}

/// Forwards fragments into a channel for a consumer on another thread.
pub struct ChannelSink {
    tx: Sender<StreamToken>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(tx: Sender<StreamToken>) -> Self {
        Self {
            tx,
            disconnected: false,
        }
    }
}

impl TokenSink for ChannelSink {
    fn on_token(&mut self, fragment: &str) {
        if self.disconnected {
            return;
        }
        if self.tx.send(StreamToken::Token(fragment.to_string())).is_err() {
            // Generation keeps running to completion; there is no cancellation.
            tracing::debug!("Stream receiver dropped, discarding remaining fragments");
            self.disconnected = true;
        }
    }
}

/// Runs one request and forwards every fragment, followed by exactly one
/// `Done` or `Error`.
pub fn stream_to_channel<B: InferenceBackend>(
    engine: &Engine<B>,
    prompt: &str,
    tx: Sender<StreamToken>,
) {
    let mut sink = ChannelSink::new(tx.clone());
    let terminal = match engine.generate(prompt, Some(&mut sink)) {
        Ok(completion) => StreamToken::Done(completion),
        Err(e) => StreamToken::Error(e),
    };
    let _ = tx.send(terminal);
}

/// Writes every fragment from `rx` to `out` and returns the terminal event.
///
/// Returns `None` if the sender hung up without one. A failed write is logged
/// once; later fragments are still drained but no longer written.
pub fn write_stream<W: Write>(rx: Receiver<StreamToken>, mut out: W) -> Option<StreamToken> {
    let mut write_failed = false;

    for event in rx {
        if event.is_done() || event.is_error() {
            return Some(event);
        }
        let Some(fragment) = event.as_token() else {
            continue;
        };
        if write_failed {
            continue;
        }
        if let Err(e) = out.write_all(fragment.as_bytes()).and_then(|_| out.flush()) {
            tracing::warn!("Failed to write output, discarding remaining fragments: {}", e);
            write_failed = true;
        }
    }

    None
}

/// Caps a token piece at `capacity` bytes, backing off to a char boundary
/// when the piece is valid UTF-8.
pub fn clamp_piece(piece: &[u8], capacity: usize) -> &[u8] {
    if piece.len() <= capacity {
        return piece;
    }
    match std::str::from_utf8(piece) {
        Ok(text) => truncate_str(text, capacity).as_bytes(),
        Err(_) => &piece[..capacity],
    }
}

/// Reassembles UTF-8 text from token pieces that may split multi-byte chars.
///
/// Only complete characters are released; an incomplete trailing sequence
/// waits for the next piece. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    pending: Vec<u8>,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a piece, returning the text that became complete, if any.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    match e.error_len() {
                        Some(bad) => {
                            out.push_str(&String::from_utf8_lossy(&self.pending[..valid + bad]));
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        (!out.is_empty()).then_some(out)
    }

    /// Releases whatever is still pending, lossily.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
