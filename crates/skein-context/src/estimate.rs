//! Token estimation.
//!
//! Estimates are heuristic thresholds, not tokenizer-exact counts. The trait
//! exists so a precise tokenizer can be swapped in without changing the
//! compression policy's contract.

use skein_protocol::ChatMessage;

/// Approximates token counts for text and conversations.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens for a piece of text. Empty text yields 0.
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for one message, flattening structured content.
    fn estimate_message(&self, message: &ChatMessage) -> usize {
        self.estimate(&message.content.to_plaintext())
    }

    /// Estimate total tokens across a conversation.
    fn estimate_conversation(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// Default estimator: ~4 characters per token, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}
