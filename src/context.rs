//! Token-budgeted context windows
//!
//! Selects the trailing run of messages that fits a token budget. Token counts
//! come from a [`TokenEstimator`]; the default [`CharRatioEstimator`] is the
//! `ceil(chars / 4)` approximation, not a real tokenizer. It undercounts for
//! CJK and other multibyte text, and callers' budgets are tuned against it.

use std::fmt;
use std::sync::Arc;

use crate::chat::ChatMessage;

/// Default characters-per-token ratio
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimates how many model tokens a piece of text costs
pub trait TokenEstimator: Send + Sync + fmt::Debug {
    fn estimate(&self, text: &str) -> usize;
}

/// `ceil(chars / ratio)` token estimate
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Stateless windowing over message histories
#[derive(Debug, Clone)]
pub struct ContextWindower {
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextWindower {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Returns the most recent messages whose estimated cost fits `max_tokens`,
    /// in chronological order.
    ///
    /// Walks backwards from the newest message and stops before the first one
    /// that would overflow the budget. If even the newest message overflows it
    /// is returned alone, so a non-empty history never yields an empty window.
    pub fn window(&self, messages: &[ChatMessage], max_tokens: usize) -> Vec<ChatMessage> {
        let mut selected: Vec<ChatMessage> = Vec::new();
        let mut total = 0usize;

        for message in messages.iter().rev() {
            let cost = self.estimator.estimate(&message.content);
            if total + cost > max_tokens && !selected.is_empty() {
                break;
            }
            total += cost;
            selected.push(message.clone());
        }

        selected.reverse();

        tracing::trace!(
            available = messages.len(),
            selected = selected.len(),
            tokens = total,
            max_tokens = max_tokens,
            "Built context window"
        );

        selected
    }

    /// Total estimated tokens across `messages`
    pub fn estimate_messages(&self, messages: &[ChatMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.estimator.estimate(&m.content))
            .sum()
    }
}

impl Default for ContextWindower {
    fn default() -> Self {
        Self::new(Arc::new(CharRatioEstimator::default()))
    }
}

/// Windows `messages` with the default `chars / 4` estimator
pub fn window(messages: &[ChatMessage], max_tokens: usize) -> Vec<ChatMessage> {
    ContextWindower::default().window(messages, max_tokens)
}
