//! Session and conversation resource management for the workspace chat assistant
//!
//! [`session::SessionStore`] hands each caller an isolated memory handle under
//! global and per-user caps. [`conversation::ConversationStore`] keeps bounded
//! message histories. [`context`] cuts histories to a token budget, and
//! [`cleanup`] sweeps both stores in the background.

pub mod agent;
pub mod chat;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod conversation;
pub mod memory;
pub mod session;
pub mod utils;

pub use utils::{BoardChatError, Result};
