use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::memory::SessionMemory;

/// Rough per-session footprint used for the stats estimate
pub const ESTIMATED_SESSION_BYTES: u64 = 50 * 1024;

/// A caller-scoped container for one conversation's working memory
///
/// Values handed out by the store are snapshots. The `memory` handle is shared
/// with the stored record and stays the same object for the session's whole
/// life.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub channel_scope: BTreeSet<String>,
    pub message_count: usize,
    pub memory: Arc<dyn SessionMemory>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        owner_id: Option<String>,
        channel_scope: BTreeSet<String>,
        memory: Arc<dyn SessionMemory>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id,
            created_at: now,
            last_accessed: now,
            channel_scope,
            message_count: 0,
            memory,
        }
    }

    /// Time since the last access, zero if `now` is earlier
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_accessed)
            .to_std()
            .unwrap_or_default()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id.as_deref() == Some(owner_id)
    }
}

/// Partial update merged into a session's metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub channel_scope: Option<BTreeSet<String>>,
    pub message_count: Option<usize>,
}

impl SessionPatch {
    pub fn channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channel_scope: Some(channels.into_iter().map(Into::into).collect()),
            message_count: None,
        }
    }

    pub fn message_count(count: usize) -> Self {
        Self {
            channel_scope: None,
            message_count: Some(count),
        }
    }

    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(channels) = self.channel_scope {
            session.channel_scope = channels;
        }
        if let Some(count) = self.message_count {
            session.message_count = count;
        }
    }
}

/// Operational snapshot of the session store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub average_age_secs: f64,
    pub average_message_count: f64,
    pub oldest_session_age_secs: u64,
    pub estimated_memory_bytes: u64,
}

/// Limits and timings for a [`SessionStore`](super::SessionStore)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStoreConfig {
    /// Idle time after which a session is swept
    pub session_ttl: Duration,
    /// Period of the session sweep
    pub cleanup_interval: Duration,
    pub max_sessions: usize,
    pub max_sessions_per_user: usize,
    /// Token cap for a memory handle's `load_context`
    pub memory_max_tokens: usize,
    /// Message cap for a memory handle
    pub memory_max_messages: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60 * 60),
            cleanup_interval: Duration::from_secs(15 * 60),
            max_sessions: 1000,
            max_sessions_per_user: 5,
            memory_max_tokens: 2000,
            memory_max_messages: 20,
        }
    }
}
