//! Background cleanup scheduling
//!
//! Each store owns one [`CleanupTask`] that periodically runs its [`Sweep`].
//! The session sweep and the conversation sweep run on independent intervals.
//! A sweep that panics is logged and the loop keeps going; a shutdown signal
//! waits for any in-flight sweep to finish before the task exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

/// Shortest accepted sweep period
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Longer periods are clamped so the first deadline stays representable
pub const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A store that can reclaim stale entries
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Label used in logs
    fn name(&self) -> &'static str;

    /// Runs one pass relative to `now`. Per-entity failures are counted in the
    /// report, never returned.
    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport;
}

/// Result of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries examined
    pub scanned: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries whose cleanup reported an error
    pub failed: usize,
}

/// Handle to a running periodic sweep
#[derive(Debug)]
pub struct CleanupTask {
    name: &'static str,
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl CleanupTask {
    /// Spawns a task running `target.sweep(Utc::now())` every `period`.
    ///
    /// The first sweep happens one full period after spawning. `period` is
    /// clamped to `[1ms, MAX_SWEEP_PERIOD]`.
    pub fn spawn(target: Arc<dyn Sweep>, period: Duration) -> Self {
        let name = target.name();
        let period = period.clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let now = Instant::now();
            let start = now
                .checked_add(period)
                .or_else(|| now.checked_add(MIN_SWEEP_PERIOD))
                .unwrap_or(now);
            let mut interval = interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!(sweep = name, "Cleanup task received shutdown signal, stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let target = Arc::clone(&target);
                        // Isolate the pass so a panic cannot end the loop
                        let pass = tokio::spawn(async move { target.sweep(Utc::now()).await });
                        match pass.await {
                            Ok(report) => {
                                debug!(
                                    sweep = name,
                                    scanned = report.scanned,
                                    removed = report.removed,
                                    failed = report.failed,
                                    "Cleanup pass finished"
                                );
                            }
                            Err(e) => {
                                error!(sweep = name, error = %e, "Cleanup pass aborted");
                            }
                        }
                    }
                }
            }
        });

        debug!(sweep = name, period = ?period, "Cleanup task started");

        Self {
            name,
            handle,
            shutdown_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the task to stop and waits until it has exited
    pub async fn shutdown(self) {
        // A closed channel means the task is already gone
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            error!(sweep = self.name, error = %e, "Cleanup task ended abnormally");
        }
    }
}
