//! Conversation histories for the chat routes

pub mod store;
pub mod types;

pub use store::ConversationStore;
pub use types::{
    Conversation, ConversationOptions, ConversationStats, ConversationStoreConfig,
    ConversationSummary, MIN_MESSAGES_PER_CONVERSATION, SNIPPET_MAX_CHARS, TITLE_MAX_CHARS,
};
