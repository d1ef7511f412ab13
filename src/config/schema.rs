use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::conversation::ConversationStoreConfig;
use crate::session::SessionStoreConfig;
use crate::utils::{BoardChatError, Result};

/// Resource limits for sessions and conversations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session_ttl_minutes: u64,
    pub cleanup_interval_minutes: u64,
    pub max_sessions: usize,
    pub max_sessions_per_user: usize,
    pub memory_max_tokens: usize,
    pub memory_max_messages: usize,
    pub max_conversations: usize,
    pub max_messages_per_conversation: usize,
    pub conversation_timeout_ms: u64,
    pub conversation_cleanup_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 60,
            cleanup_interval_minutes: 15,
            max_sessions: 1000,
            max_sessions_per_user: 5,
            memory_max_tokens: 2000,
            memory_max_messages: 20,
            max_conversations: 1000,
            max_messages_per_conversation: 100,
            conversation_timeout_ms: 24 * 60 * 60 * 1000,
            conversation_cleanup_interval_minutes: 60,
        }
    }
}

impl Config {
    /// Rejects zero durations and capacities
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 10] = [
            ("session_ttl_minutes", self.session_ttl_minutes > 0),
            ("cleanup_interval_minutes", self.cleanup_interval_minutes > 0),
            ("max_sessions", self.max_sessions > 0),
            ("max_sessions_per_user", self.max_sessions_per_user > 0),
            ("memory_max_tokens", self.memory_max_tokens > 0),
            ("memory_max_messages", self.memory_max_messages > 0),
            ("max_conversations", self.max_conversations > 0),
            ("max_messages_per_conversation", self.max_messages_per_conversation > 0),
            ("conversation_timeout_ms", self.conversation_timeout_ms > 0),
            (
                "conversation_cleanup_interval_minutes",
                self.conversation_cleanup_interval_minutes > 0,
            ),
        ];

        match checks.iter().find(|(_, ok)| !ok) {
            Some((key, _)) => Err(BoardChatError::config(format!("{} must be greater than 0", key))),
            None => Ok(()),
        }
    }

    pub fn session_store_config(&self) -> SessionStoreConfig {
        SessionStoreConfig {
            session_ttl: minutes(self.session_ttl_minutes),
            cleanup_interval: minutes(self.cleanup_interval_minutes),
            max_sessions: self.max_sessions,
            max_sessions_per_user: self.max_sessions_per_user,
            memory_max_tokens: self.memory_max_tokens,
            memory_max_messages: self.memory_max_messages,
        }
    }

    pub fn conversation_store_config(&self) -> ConversationStoreConfig {
        ConversationStoreConfig {
            max_conversations: self.max_conversations,
            max_messages_per_conversation: self.max_messages_per_conversation,
            conversation_timeout: Duration::from_millis(self.conversation_timeout_ms),
            cleanup_interval: minutes(self.conversation_cleanup_interval_minutes),
        }
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.conversation_timeout_ms, 86_400_000);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            max_sessions_per_user: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_sessions_per_user"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "max_sessions": 50, "session_ttl_minutes": 5 }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_sessions, 50);
        assert_eq!(config.session_ttl_minutes, 5);
        assert_eq!(config.max_sessions_per_user, 5);
    }

    #[test]
    fn test_store_configs() {
        let config = Config {
            session_ttl_minutes: 2,
            conversation_timeout_ms: 1500,
            ..Default::default()
        };

        let sessions = config.session_store_config();
        assert_eq!(sessions.session_ttl, Duration::from_secs(120));
        assert_eq!(sessions.cleanup_interval, Duration::from_secs(15 * 60));

        let conversations = config.conversation_store_config();
        assert_eq!(conversations.conversation_timeout, Duration::from_millis(1500));
        assert_eq!(conversations.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(conversations.max_messages_per_conversation, 100);
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("session_ttl_minutes"));
        assert!(json.contains("max_messages_per_conversation"));
    }
}
