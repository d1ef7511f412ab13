//! In-process conversation buffer memory
//!
//! Holds the latest exchanges of one session in a VecDeque with FIFO
//! rotation. Not persisted; cleared with the session.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MemoryError, SessionMemory};
use crate::chat::ChatMessage;
use crate::context::ContextWindower;

/// Bounded message buffer backing a session's memory handle
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct BufferMemory {
    messages: Arc<RwLock<VecDeque<ChatMessage>>>,
    max_messages: usize,
    max_tokens: usize,
    windower: ContextWindower,
}

impl BufferMemory {
    /// Creates an empty buffer keeping at most `max_messages` messages and
    /// never loading more than `max_tokens` at once
    pub fn new(max_messages: usize, max_tokens: usize) -> Self {
        let max_messages = max_messages.max(2);
        Self {
            messages: Arc::new(RwLock::new(VecDeque::with_capacity(max_messages))),
            max_messages,
            max_tokens,
            windower: ContextWindower::default(),
        }
    }

    pub fn with_windower(mut self, windower: ContextWindower) -> Self {
        self.windower = windower;
        self
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Copy of every held message, oldest first
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl SessionMemory for BufferMemory {
    async fn load_context(&self, max_tokens: usize) -> Vec<ChatMessage> {
        let budget = max_tokens.min(self.max_tokens);
        let messages = self.messages.read().await;
        let history: Vec<ChatMessage> = messages.iter().cloned().collect();
        drop(messages);

        self.windower.window(&history, budget)
    }

    async fn save_context(&self, input: &str, output: &str) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;

        messages.push_back(ChatMessage::user(input));
        messages.push_back(ChatMessage::assistant(output));

        while messages.len() > self.max_messages {
            messages.pop_front();
        }

        tracing::debug!(
            message_count = messages.len(),
            max_messages = self.max_messages,
            "Saved exchange to session memory"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        let dropped = messages.len();
        messages.clear();
        tracing::debug!(dropped = dropped, "Session memory cleared");
        Ok(())
    }

    async fn len(&self) -> usize {
        self.messages.read().await.len()
    }
}
