//! Error types for session memory handles

use thiserror::Error;

/// Failure reported by a memory handle
#[derive(Error, Debug)]
pub enum MemoryError {
    /// The backing implementation could not complete the operation
    #[error("Memory backend failed: {message}")]
    Backend { message: String },
}

impl MemoryError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
