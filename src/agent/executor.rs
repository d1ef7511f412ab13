use async_trait::async_trait;

use crate::chat::ChatMessage;
use crate::utils::Result;

/// Produces the assistant's reply for one user input
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// `history` is the token-budgeted memory of the session, oldest first
    async fn respond(&self, history: &[ChatMessage], input: &str) -> Result<String>;
}

/// Offline stand-in that repeats the question back
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoAgent;

#[async_trait]
impl AgentExecutor for EchoAgent {
    async fn respond(&self, history: &[ChatMessage], input: &str) -> Result<String> {
        Ok(format!(
            "You asked: {} ({} earlier messages in context)",
            input.trim(),
            history.len()
        ))
    }
}
