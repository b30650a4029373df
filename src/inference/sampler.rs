//! Greedy token selection

use crate::inference::backend::{DecodeContext, Token};

/// Always picks the highest-logit token. Ties go to the lowest id.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        GreedySampler
    }

    /// Sample from the logits of batch slot `index` of the last decode.
    pub fn sample<C: DecodeContext + ?Sized>(&self, ctx: &C, index: i32) -> Token {
        Self::argmax(ctx.logits(index))
    }

    pub fn argmax(logits: &[f32]) -> Token {
        let mut best_token = 0i32;
        let mut best_logit = f32::NEG_INFINITY;

        for (i, &logit) in logits.iter().enumerate() {
            if logit > best_logit {
                best_logit = logit;
                best_token = i as i32;
            }
        }

        Token(best_token)
    }
}
