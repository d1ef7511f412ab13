use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cleanup::{CleanupTask, Sweep, SweepReport};
use crate::memory::{MemoryFactory, buffer_memory_factory};
use crate::session::types::{
    ESTIMATED_SESSION_BYTES, Session, SessionPatch, SessionStats, SessionStoreConfig,
};
use crate::utils::{BoardChatError, Result};

/// Why a session left the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Capacity,
    UserQuota,
    Expired,
    Cleared,
    Disposed,
}

impl fmt::Display for Removal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Removal::Capacity => "capacity",
            Removal::UserQuota => "user_quota",
            Removal::Expired => "expired",
            Removal::Cleared => "cleared",
            Removal::Disposed => "disposed",
        };
        f.write_str(label)
    }
}

/// Number of sessions evicted when the global cap is hit: 10%, at least one
fn eviction_batch(max_sessions: usize) -> usize {
    max_sessions.div_ceil(10).max(1)
}

struct SessionEntry {
    session: Session,
    /// Insertion order, breaks `last_accessed` ties
    seq: u64,
}

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, SessionEntry>,
    next_seq: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl SessionState {
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

    /// Up to `limit` ids matching `filter`, least recently accessed first
    fn least_recent<F>(&self, limit: usize, filter: F) -> Vec<String>
    where
        F: Fn(&Session) -> bool,
    {
        let mut candidates: Vec<(&DateTime<Utc>, u64, &String)> = self
            .sessions
            .iter()
            .filter(|(_, entry)| filter(&entry.session))
            .map(|(id, entry)| (&entry.session.last_accessed, entry.seq, id))
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .take(limit)
            .map(|(_, _, id)| id.clone())
            .collect()
    }

    fn owned_count(&self, owner_id: &str) -> usize {
        self.sessions
            .values()
            .filter(|entry| entry.session.is_owned_by(owner_id))
            .count()
    }

    /// Clears the session's memory, then drops the entry.
    ///
    /// Returns `None` if absent, `Some(false)` if the memory clear failed. The
    /// entry is removed either way.
    async fn remove(&mut self, id: &str, reason: Removal) -> Option<bool> {
        let memory = Arc::clone(&self.sessions.get(id)?.session.memory);

        let cleared = match memory.clear().await {
            Ok(()) => true,
            Err(e) => {
                let err = BoardChatError::cleanup(id, e.to_string());
                warn!(session_id = %id, reason = %reason, error = %err, "Failed to clear session memory");
                false
            }
        };

        self.sessions.remove(id);
        debug!(session_id = %id, reason = %reason, "Session removed");
        Some(cleared)
    }
}

struct SessionShared {
    state: RwLock<SessionState>,
    config: SessionStoreConfig,
    memory_factory: MemoryFactory,
}

impl SessionShared {
    async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let ttl = self.config.session_ttl;
        let mut state = self.state.write().await;
        let scanned = state.sessions.len();

        let expired = state.least_recent(usize::MAX, |session| session.idle_for(now) > ttl);

        let mut report = SweepReport {
            scanned,
            ..Default::default()
        };
        for id in expired {
            match state.remove(&id, Removal::Expired).await {
                Some(true) => report.removed += 1,
                Some(false) => {
                    report.removed += 1;
                    report.failed += 1;
                }
                None => {}
            }
        }

        if report.removed > 0 {
            info!(
                sessions_scanned = report.scanned,
                sessions_expired = report.removed,
                failed = report.failed,
                "Session cleanup complete"
            );
        }
        report
    }
}

#[async_trait]
impl Sweep for SessionShared {
    fn name(&self) -> &'static str {
        "sessions"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.sweep_expired(now).await
    }
}

/// In-memory session registry with capacity limits and TTL expiry
///
/// All map mutation goes through one write lock, so a sweep and a request
/// touching the same id are serialized and a memory handle is cleared once.
pub struct SessionStore {
    shared: Arc<SessionShared>,
    cleanup: Mutex<Option<CleanupTask>>,
    disposed: AtomicBool,
}

impl SessionStore {
    /// Creates a store whose sessions get [`BufferMemory`](crate::memory::BufferMemory) handles
    pub fn new(config: SessionStoreConfig) -> Self {
        let factory = buffer_memory_factory(config.memory_max_messages, config.memory_max_tokens);
        Self::with_memory_factory(config, factory)
    }

    pub fn with_memory_factory(config: SessionStoreConfig, memory_factory: MemoryFactory) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                state: RwLock::new(SessionState::default()),
                config,
                memory_factory,
            }),
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.shared.config
    }

    /// Starts the periodic session sweep. Calling it again is a no-op.
    pub async fn initialize(&self) {
        let mut cleanup = self.cleanup.lock().await;
        // Checked under the lock so a concurrent dispose cannot miss the task
        if self.disposed.load(Ordering::SeqCst) {
            warn!("SessionStore already disposed, not starting cleanup");
            return;
        }
        if cleanup.is_some() {
            return;
        }

        let target: Arc<dyn Sweep> = Arc::clone(&self.shared) as Arc<dyn Sweep>;
        *cleanup = Some(CleanupTask::spawn(target, self.shared.config.cleanup_interval));

        info!(
            ttl_secs = self.shared.config.session_ttl.as_secs(),
            interval_secs = self.shared.config.cleanup_interval.as_secs(),
            max_sessions = self.shared.config.max_sessions,
            "SessionStore initialized"
        );
    }

    /// Returns the session for `id`, creating it if needed.
    ///
    /// An existing session only has its `last_accessed` refreshed. Before a
    /// new one is inserted the global cap and the owner's quota are enforced
    /// by evicting least recently used sessions.
    pub async fn get_or_create<I, S>(
        &self,
        id: &str,
        owner_id: Option<&str>,
        channel_scope: I,
    ) -> Session
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channel_scope: BTreeSet<String> = channel_scope.into_iter().map(Into::into).collect();
        let config = &self.shared.config;

        let mut state = self.shared.state.write().await;
        let now = state.stamp();

        if let Some(entry) = state.sessions.get_mut(id) {
            entry.session.last_accessed = now;
            return entry.session.clone();
        }

        let max_sessions = config.max_sessions.max(1);
        if state.sessions.len() >= max_sessions {
            let victims = state.least_recent(eviction_batch(max_sessions), |_| true);
            let evicted = victims.len();
            for victim in victims {
                state.remove(&victim, Removal::Capacity).await;
            }
            info!(
                evicted = evicted,
                remaining = state.sessions.len(),
                max_sessions = max_sessions,
                "Session capacity reached, evicted least recently used"
            );
        }

        if let Some(owner) = owner_id {
            let quota = config.max_sessions_per_user.max(1);
            let owned = state.owned_count(owner);
            if owned >= quota {
                let victims = state.least_recent(owned - quota + 1, |s| s.is_owned_by(owner));
                for victim in victims {
                    state.remove(&victim, Removal::UserQuota).await;
                }
                debug!(owner_id = %owner, quota = quota, "Per-user session quota enforced");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let memory = (self.shared.memory_factory)();
        let session = Session::new(id, owner_id.map(str::to_string), channel_scope, memory, now);
        state.sessions.insert(
            id.to_string(),
            SessionEntry {
                session: session.clone(),
                seq,
            },
        );

        debug!(session_id = %id, total = state.sessions.len(), "Session created");
        session
    }

    /// Snapshot of a session without refreshing its access time
    pub async fn get(&self, id: &str) -> Option<Session> {
        let state = self.shared.state.read().await;
        state.sessions.get(id).map(|entry| entry.session.clone())
    }

    /// Clears the session's memory and removes it. Returns false if absent.
    pub async fn clear(&self, id: &str) -> bool {
        let mut state = self.shared.state.write().await;
        state.remove(id, Removal::Cleared).await.is_some()
    }

    /// Merges `patch` into the session and refreshes its access time.
    /// Returns false if absent.
    pub async fn update_metadata(&self, id: &str, patch: SessionPatch) -> bool {
        let mut state = self.shared.state.write().await;
        let now = state.stamp();
        match state.sessions.get_mut(id) {
            Some(entry) => {
                patch.apply(&mut entry.session);
                entry.session.last_accessed = now;
                true
            }
            None => false,
        }
    }

    /// Saves one exchange to the session's memory and counts both messages.
    /// Returns `Ok(false)` if the session is absent.
    pub async fn record_turn(&self, id: &str, input: &str, output: &str) -> Result<bool> {
        let mut state = self.shared.state.write().await;
        let now = state.stamp();
        let Some(entry) = state.sessions.get_mut(id) else {
            return Ok(false);
        };

        entry
            .session
            .memory
            .save_context(input, output)
            .await
            .map_err(|e| BoardChatError::memory(id, e))?;
        entry.session.message_count += 2;
        entry.session.last_accessed = now;
        Ok(true)
    }

    /// Runs one expiry pass as if the clock read `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        self.shared.sweep_expired(now).await
    }

    pub async fn len(&self) -> usize {
        self.shared.state.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> SessionStats {
        let state = self.shared.state.read().await;
        let now = Utc::now();
        let total = state.sessions.len();
        if total == 0 {
            return SessionStats::default();
        }

        let mut age_sum = 0f64;
        let mut oldest = 0u64;
        let mut messages = 0usize;
        for entry in state.sessions.values() {
            let age = entry.session.age(now);
            age_sum += age.as_secs_f64();
            oldest = oldest.max(age.as_secs());
            messages += entry.session.message_count;
        }

        SessionStats {
            total_sessions: total,
            average_age_secs: age_sum / total as f64,
            average_message_count: messages as f64 / total as f64,
            oldest_session_age_secs: oldest,
            estimated_memory_bytes: ESTIMATED_SESSION_BYTES * total as u64,
        }
    }

    /// Stops the sweep, waits for it to exit, then clears every session.
    ///
    /// Later calls are no-ops. The store stays usable afterwards but nothing
    /// sweeps it any more.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let task = self.cleanup.lock().await.take();
        if let Some(task) = task {
            task.shutdown().await;
        }

        let mut state = self.shared.state.write().await;
        let ids = state.least_recent(usize::MAX, |_| true);
        let count = ids.len();
        for id in ids {
            state.remove(&id, Removal::Disposed).await;
        }

        info!(sessions_cleared = count, "SessionStore disposed");
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}
