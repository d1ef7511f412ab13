use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::chat::{ChatMessage, MessagePatch};
use crate::cleanup::{CleanupTask, Sweep, SweepReport};
use crate::context::ContextWindower;
use crate::conversation::types::{
    Conversation, ConversationOptions, ConversationStats, ConversationStoreConfig,
    ConversationSummary, MIN_MESSAGES_PER_CONVERSATION, derive_title,
};
use crate::utils::{BoardChatError, Result};

struct ConversationEntry {
    conversation: Conversation,
    /// Creation order, breaks timestamp ties
    seq: u64,
    /// A user message has been appended, so the title is settled
    seen_user: bool,
}

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<String, ConversationEntry>,
    /// Store-level last access per conversation, drives the sweep
    access: HashMap<String, DateTime<Utc>>,
    next_seq: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl ConversationState {
    /// Wall-clock timestamp, strictly later than any previously issued one
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::nanoseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    /// Marks the conversation modified and accessed
    fn touch(&mut self, id: &str) -> Option<&mut Conversation> {
        self.touch_entry(id).map(|entry| &mut entry.conversation)
    }

    fn touch_entry(&mut self, id: &str) -> Option<&mut ConversationEntry> {
        let now = self.stamp();
        let entry = self.conversations.get_mut(id)?;
        entry.conversation.updated_at = now;
        self.access.insert(id.to_string(), now);
        Some(entry)
    }

    /// `(last_access, id)` pairs, oldest first
    fn by_access(&self) -> Vec<(DateTime<Utc>, String)> {
        let mut ordered: Vec<(DateTime<Utc>, u64, &String)> = self
            .conversations
            .iter()
            .map(|(id, entry)| {
                let accessed = self
                    .access
                    .get(id)
                    .copied()
                    .unwrap_or(entry.conversation.updated_at);
                (accessed, entry.seq, id)
            })
            .collect();
        ordered.sort();
        ordered
            .into_iter()
            .map(|(accessed, _, id)| (accessed, id.clone()))
            .collect()
    }

    fn remove(&mut self, id: &str) -> bool {
        self.access.remove(id);
        self.conversations.remove(id).is_some()
    }
}

struct ConversationShared {
    state: RwLock<ConversationState>,
    config: ConversationStoreConfig,
    windower: ContextWindower,
}

impl ConversationShared {
    async fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let timeout = chrono::Duration::from_std(self.config.conversation_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        let mut state = self.state.write().await;
        let scanned = state.conversations.len();

        let (stale, live): (Vec<_>, Vec<_>) = state
            .by_access()
            .into_iter()
            .partition(|(accessed, _)| now.signed_duration_since(*accessed) > timeout);

        let mut expired = 0usize;
        for (_, id) in &stale {
            if state.remove(id) {
                expired += 1;
                debug!(conversation_id = %id, "Conversation expired");
            }
        }

        // Hard cap regardless of individual timeouts, oldest access first
        let mut over_cap = 0usize;
        let excess = live.len().saturating_sub(self.config.max_conversations);
        for (_, id) in live.iter().take(excess) {
            if state.remove(id) {
                over_cap += 1;
                debug!(conversation_id = %id, "Conversation removed over capacity");
            }
        }

        let report = SweepReport {
            scanned,
            removed: expired + over_cap,
            failed: 0,
        };
        if report.removed > 0 {
            info!(
                conversations_scanned = scanned,
                conversations_expired = expired,
                conversations_over_cap = over_cap,
                "Conversation cleanup complete"
            );
        }
        report
    }
}

#[async_trait]
impl Sweep for ConversationShared {
    fn name(&self) -> &'static str {
        "conversations"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.run_sweep(now).await
    }
}

/// In-memory conversation histories with a per-conversation message cap
///
/// Writes take the store's write lock. `get_context`, `list` and the other
/// reads share the read lock.
pub struct ConversationStore {
    shared: Arc<ConversationShared>,
    cleanup: Mutex<Option<CleanupTask>>,
    disposed: AtomicBool,
}

impl ConversationStore {
    pub fn new(config: ConversationStoreConfig) -> Self {
        Self::with_windower(config, ContextWindower::default())
    }

    /// Creates a store whose `get_context` uses `windower`
    pub fn with_windower(mut config: ConversationStoreConfig, windower: ContextWindower) -> Self {
        if config.max_messages_per_conversation < MIN_MESSAGES_PER_CONVERSATION {
            warn!(
                configured = config.max_messages_per_conversation,
                applied = MIN_MESSAGES_PER_CONVERSATION,
                "max_messages_per_conversation too small, raising"
            );
            config.max_messages_per_conversation = MIN_MESSAGES_PER_CONVERSATION;
        }

        Self {
            shared: Arc::new(ConversationShared {
                state: RwLock::new(ConversationState::default()),
                config,
                windower,
            }),
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Effective configuration, after clamping
    pub fn config(&self) -> &ConversationStoreConfig {
        &self.shared.config
    }

    /// Starts the periodic conversation sweep. Calling it again is a no-op.
    pub async fn initialize(&self) {
        let mut cleanup = self.cleanup.lock().await;
        if self.disposed.load(Ordering::SeqCst) {
            warn!("ConversationStore already disposed, not starting cleanup");
            return;
        }
        if cleanup.is_some() {
            return;
        }

        let target: Arc<dyn Sweep> = Arc::clone(&self.shared) as Arc<dyn Sweep>;
        *cleanup = Some(CleanupTask::spawn(target, self.shared.config.cleanup_interval));

        info!(
            timeout_secs = self.shared.config.conversation_timeout.as_secs(),
            interval_secs = self.shared.config.cleanup_interval.as_secs(),
            max_conversations = self.shared.config.max_conversations,
            "ConversationStore initialized"
        );
    }

    /// Starts an empty conversation with a fresh random id
    pub async fn create<I, S>(&self, channel_scope: I, options: ConversationOptions) -> Conversation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channel_scope: BTreeSet<String> = channel_scope.into_iter().map(Into::into).collect();

        let mut state = self.shared.state.write().await;
        let now = state.stamp();
        let conversation = Conversation::new(channel_scope, options, now);
        let seq = state.next_seq;
        state.next_seq += 1;

        state.access.insert(conversation.id.clone(), now);
        state.conversations.insert(
            conversation.id.clone(),
            ConversationEntry {
                conversation: conversation.clone(),
                seq,
                seen_user: false,
            },
        );

        debug!(conversation_id = %conversation.id, "Conversation created");
        conversation
    }

    /// Appends `message`, dropping the oldest messages first if the cap is hit.
    ///
    /// The first user message also becomes the title. If that message is
    /// blank the conversation stays untitled.
    pub async fn add_message(&self, conversation_id: &str, message: ChatMessage) -> Result<ChatMessage> {
        let cap = self.shared.config.max_messages_per_conversation;

        let mut state = self.shared.state.write().await;
        let entry = state
            .touch_entry(conversation_id)
            .ok_or_else(|| BoardChatError::conversation_not_found(conversation_id))?;

        if message.is_user() && !entry.seen_user {
            entry.seen_user = true;
            entry.conversation.title = derive_title(&message.content);
        }

        let conversation = &mut entry.conversation;

        if conversation.messages.len() >= cap {
            // cap >= 3, so at least two prior messages survive
            let excess = conversation.messages.len() - cap + 1;
            conversation.messages.drain(..excess);
            debug!(
                conversation_id = %conversation_id,
                dropped = excess,
                cap = cap,
                "Trimmed oldest messages"
            );
        }

        conversation.messages.push(message.clone());
        Ok(message)
    }

    /// Token-budgeted tail of the conversation, empty if it does not exist
    pub async fn get_context(&self, conversation_id: &str, max_tokens: usize) -> Vec<ChatMessage> {
        let state = self.shared.state.read().await;
        match state.conversations.get(conversation_id) {
            Some(entry) => self
                .shared
                .windower
                .window(&entry.conversation.messages, max_tokens),
            None => Vec::new(),
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        let state = self.shared.state.read().await;
        state
            .conversations
            .get(conversation_id)
            .map(|entry| entry.conversation.clone())
    }

    /// Summaries, most recently updated first
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let state = self.shared.state.read().await;
        let mut entries: Vec<&ConversationEntry> = state.conversations.values().collect();
        entries.sort_by(|a, b| {
            b.conversation
                .updated_at
                .cmp(&a.conversation.updated_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries
            .into_iter()
            .map(|entry| entry.conversation.summary())
            .collect()
    }

    /// Removes the conversation. Returns false if absent.
    pub async fn delete(&self, conversation_id: &str) -> bool {
        let mut state = self.shared.state.write().await;
        let removed = state.remove(conversation_id);
        if removed {
            debug!(conversation_id = %conversation_id, "Conversation deleted");
        }
        removed
    }

    pub async fn update_channels<I, S>(&self, conversation_id: &str, channels: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: BTreeSet<String> = channels.into_iter().map(Into::into).collect();
        let mut state = self.shared.state.write().await;
        match state.touch(conversation_id) {
            Some(conversation) => {
                conversation.channel_scope = channels;
                true
            }
            None => false,
        }
    }

    /// Shallow-merges `options` into the conversation's options
    pub async fn update_options(&self, conversation_id: &str, options: ConversationOptions) -> bool {
        let mut state = self.shared.state.write().await;
        match state.touch(conversation_id) {
            Some(conversation) => {
                conversation.options.merge(options);
                true
            }
            None => false,
        }
    }

    /// Patches one message in place. False if either id is unknown.
    pub async fn update_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        patch: MessagePatch,
    ) -> bool {
        let mut state = self.shared.state.write().await;
        let found = state
            .conversations
            .get(conversation_id)
            .is_some_and(|entry| entry.conversation.messages.iter().any(|m| m.id() == message_id));
        if !found {
            return false;
        }

        let Some(conversation) = state.touch(conversation_id) else {
            return false;
        };
        match conversation.messages.iter_mut().find(|m| m.id() == message_id) {
            Some(message) => {
                message.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Runs one sweep as if the clock read `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.shared.run_sweep(now).await
    }

    pub async fn len(&self) -> usize {
        self.shared.state.read().await.conversations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> ConversationStats {
        let state = self.shared.state.read().await;
        let total = state.conversations.len();
        if total == 0 {
            return ConversationStats::default();
        }

        let now = Utc::now();
        let total_messages: usize = state
            .conversations
            .values()
            .map(|entry| entry.conversation.messages.len())
            .sum();
        let oldest_access_age_secs = state
            .access
            .values()
            .map(|accessed| {
                now.signed_duration_since(*accessed)
                    .to_std()
                    .unwrap_or_default()
                    .as_secs()
            })
            .max()
            .unwrap_or(0);

        ConversationStats {
            total_conversations: total,
            total_messages,
            average_messages: total_messages as f64 / total as f64,
            oldest_access_age_secs,
        }
    }

    /// Stops the sweep, waits for it to exit, then drops every conversation.
    /// Later calls are no-ops.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let task = self.cleanup.lock().await.take();
        if let Some(task) = task {
            task.shutdown().await;
        }

        let mut state = self.shared.state.write().await;
        let count = state.conversations.len();
        state.conversations.clear();
        state.access.clear();

        info!(conversations_cleared = count, "ConversationStore disposed");
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(ConversationStoreConfig::default())
    }
}
