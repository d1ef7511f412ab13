//! Per-session working memory
//!
//! Each session owns one isolated [`SessionMemory`] handle. The agent executor
//! loads a token-budgeted view of it before each turn and saves the turn
//! afterwards. The store clears the handle when the session is evicted,
//! expired or explicitly cleared.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chat::ChatMessage;

pub mod buffer;
pub mod types;

pub use buffer::BufferMemory;
pub use types::MemoryError;

/// Memory protocol consumed by the agent executor
#[async_trait]
pub trait SessionMemory: Send + Sync + fmt::Debug {
    /// Most recent messages fitting `max_tokens`, oldest first
    async fn load_context(&self, max_tokens: usize) -> Vec<ChatMessage>;

    /// Records one exchange: the user's input and the agent's output
    async fn save_context(&self, input: &str, output: &str) -> Result<(), MemoryError>;

    /// Drops everything held by this handle
    async fn clear(&self) -> Result<(), MemoryError>;

    /// Number of messages currently held
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Builds a fresh, unshared memory handle for each new session
pub type MemoryFactory = Arc<dyn Fn() -> Arc<dyn SessionMemory> + Send + Sync>;

/// Factory producing [`BufferMemory`] handles with the given bounds
pub fn buffer_memory_factory(max_messages: usize, max_tokens: usize) -> MemoryFactory {
    Arc::new(move || Arc::new(BufferMemory::new(max_messages, max_tokens)) as Arc<dyn SessionMemory>)
}
