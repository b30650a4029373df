//! Fixed-capacity decode batch

use thiserror::Error;

use crate::inference::backend::Token;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("Batch is full (capacity {0})")]
    Full(usize),

    #[error("Batch capacity must be at least one slot")]
    ZeroCapacity,
}

/// One token submitted for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSlot {
    pub token: Token,
    /// Position of the token in the sequence
    pub pos: i32,
    /// Sequences the token belongs to
    pub seq_ids: Vec<i32>,
    /// Whether the decode should produce logits for this slot
    pub logits: bool,
}

/// A set of at most `capacity` slots decoded together.
///
/// Allocated once per session and cleared between chunks.
#[derive(Debug)]
pub struct Batch {
    slots: Vec<BatchSlot>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Result<Self, BatchError> {
        if capacity == 0 {
            return Err(BatchError::ZeroCapacity);
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        })
    }

    pub fn add(
        &mut self,
        token: Token,
        pos: i32,
        seq_ids: &[i32],
        logits: bool,
    ) -> Result<(), BatchError> {
        if self.slots.len() >= self.capacity {
            return Err(BatchError::Full(self.capacity));
        }
        self.slots.push(BatchSlot {
            token,
            pos,
            seq_ids: seq_ids.to_vec(),
            logits,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn slots(&self) -> &[BatchSlot] {
        &self.slots
    }

    pub fn n_tokens(&self) -> i32 {
        self.slots.len() as i32
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
