//! Centralized error types and conversions for boardchat
//!
//! Library code returns `BoardChatError`. The CLI wraps it in `anyhow` for context.

use std::path::PathBuf;
use thiserror::Error;

use crate::memory::MemoryError;

/// Global error type for boardchat operations
#[derive(Error, Debug)]
pub enum BoardChatError {
    /// A write targeted a conversation that does not exist
    #[error("Conversation not found: {conversation_id}")]
    ConversationNotFound { conversation_id: String },

    /// An individual eviction or expiry failed during cleanup
    #[error("Cleanup failed for {entity_id}: {message}")]
    Cleanup { entity_id: String, message: String },

    /// A session memory handle reported a failure
    #[error("Memory error for session {session_id}: {message}")]
    Memory { session_id: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid caller input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// IO errors with path context
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BoardChatError {
    /// Create a conversation-not-found error
    pub fn conversation_not_found(conversation_id: impl Into<String>) -> Self {
        Self::ConversationNotFound {
            conversation_id: conversation_id.into(),
        }
    }

    /// Create a cleanup error for a single entity
    pub fn cleanup(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cleanup {
            entity_id: entity_id.into(),
            message: message.into(),
        }
    }

    /// Create a memory error
    pub fn memory(session_id: impl Into<String>, source: MemoryError) -> Self {
        Self::Memory {
            session_id: session_id.into(),
            message: source.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the caller or the next sweep can recover from this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            BoardChatError::ConversationNotFound { .. } => true,
            BoardChatError::Cleanup { .. } => true,
            BoardChatError::Memory { .. } => true,
            BoardChatError::InvalidInput { .. } => true,
            BoardChatError::Io { .. } => true,
            // Bad config is fixed by the operator, not by retrying
            BoardChatError::Config { .. } => false,
            BoardChatError::Serialization { .. } => false,
        }
    }

    /// Returns the level this error should be logged at
    pub fn severity(&self) -> tracing::Level {
        match self {
            BoardChatError::Config { .. } => tracing::Level::ERROR,
            BoardChatError::Serialization { .. } => tracing::Level::ERROR,
            BoardChatError::Cleanup { .. } => tracing::Level::WARN,
            BoardChatError::Memory { .. } => tracing::Level::WARN,
            BoardChatError::Io { .. } => tracing::Level::WARN,
            BoardChatError::ConversationNotFound { .. } => tracing::Level::INFO,
            BoardChatError::InvalidInput { .. } => tracing::Level::INFO,
        }
    }
}

/// Result type alias using BoardChatError
pub type Result<T> = std::result::Result<T, BoardChatError>;

impl From<serde_json::Error> for BoardChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BoardChatError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source: err,
        }
    }
}
