use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use crate::chat::ChatMessage;

/// Titles are cut to this many characters
pub const TITLE_MAX_CHARS: usize = 50;

/// Listing snippets are cut to this many characters
pub const SNIPPET_MAX_CHARS: usize = 100;

/// Smallest usable per-conversation message cap: two prior messages plus the new one
pub const MIN_MESSAGES_PER_CONVERSATION: usize = 3;

/// Per-conversation agent options, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,
    /// Search thread replies as well as top-level messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_threads: Option<bool>,
}

impl ConversationOptions {
    /// Shallow merge: every field set in `patch` overwrites ours
    pub fn merge(&mut self, patch: ConversationOptions) {
        if patch.model.is_some() {
            self.model = patch.model;
        }
        if patch.temperature.is_some() {
            self.temperature = patch.temperature;
        }
        if patch.max_context_tokens.is_some() {
            self.max_context_tokens = patch.max_context_tokens;
        }
        if patch.include_threads.is_some() {
            self.include_threads = patch.include_threads;
        }
    }
}

/// A chat's message history and settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub channel_scope: BTreeSet<String>,
    pub options: ConversationOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub(crate) fn new(
        channel_scope: BTreeSet<String>,
        options: ConversationOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            channel_scope,
            options,
            title: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            last_message: self.messages.last().map(|m| snippet(&m.content)),
            message_count: self.messages.len(),
            channel_scope: self.channel_scope.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub last_message: Option<String>,
    pub message_count: usize,
    pub channel_scope: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_messages: usize,
    pub average_messages: f64,
    pub oldest_access_age_secs: u64,
}

/// Limits and timings for a [`ConversationStore`](super::ConversationStore)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStoreConfig {
    /// Hard cap enforced by the sweep
    pub max_conversations: usize,
    pub max_messages_per_conversation: usize,
    /// Idle time after which a conversation is swept
    pub conversation_timeout: Duration,
    /// Period of the conversation sweep
    pub cleanup_interval: Duration,
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self {
            max_conversations: 1000,
            max_messages_per_conversation: 100,
            conversation_timeout: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Title derived from the first user message, `None` for blank content
pub(crate) fn derive_title(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        Some(format!("{}...", head.trim_end()))
    } else {
        Some(trimmed.to_string())
    }
}

fn snippet(content: &str) -> String {
    content.chars().take(SNIPPET_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_short() {
        assert_eq!(
            derive_title("  Where is the on-call doc?  "),
            Some("Where is the on-call doc?".to_string())
        );
    }

    #[test]
    fn test_derive_title_truncates() {
        let long = "a".repeat(80);
        let title = derive_title(&long).unwrap();
        assert_eq!(title, format!("{}...", "a".repeat(TITLE_MAX_CHARS)));
    }

    #[test]
    fn test_derive_title_blank() {
        assert_eq!(derive_title("   "), None);
    }

    #[test]
    fn test_snippet_limit_is_in_chars() {
        let text = "é".repeat(150);
        let cut = snippet(&text);
        assert_eq!(cut.chars().count(), SNIPPET_MAX_CHARS);
    }

    #[test]
    fn test_options_merge() {
        let mut options = ConversationOptions {
            model: Some("fast".to_string()),
            temperature: Some(0.2),
            ..Default::default()
        };
        options.merge(ConversationOptions {
            temperature: Some(0.7),
            include_threads: Some(true),
            ..Default::default()
        });

        assert_eq!(options.model.as_deref(), Some("fast"));
        assert_eq!(options.temperature, Some(0.7));
        assert_eq!(options.include_threads, Some(true));
        assert_eq!(options.max_context_tokens, None);
    }

    #[test]
    fn test_summary() {
        let mut conversation =
            Conversation::new(BTreeSet::from(["eng".to_string()]), Default::default(), Utc::now());
        assert!(conversation.summary().last_message.is_none());

        conversation.messages.push(ChatMessage::user("x".repeat(120)));
        let summary = conversation.summary();
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.last_message.unwrap().len(), SNIPPET_MAX_CHARS);
        assert!(summary.channel_scope.contains("eng"));
    }

    #[test]
    fn test_serialization() {
        let conversation = Conversation::new(BTreeSet::new(), Default::default(), Utc::now());
        let json = serde_json::to_string(&conversation).unwrap();
        assert!(json.contains("channel_scope"));
        assert!(json.contains("updated_at"));
        assert!(!json.contains("title"));
    }
}
