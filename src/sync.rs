//! Debounced upload of the local score to the shared ranking store.
//!
//! Every change restarts the debounce timer, so a burst of edits produces a
//! single write carrying the latest values.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::capacity::CapacityStore;
use crate::error::SyncError;
use crate::leaderboard::LeaderboardCache;
use crate::ranking::RankingStore;
use crate::scoring::build_entry;
use crate::session::EngineEvent;

/// A single delayed job. Scheduling a new job cancels the previous one.
#[derive(Default)]
pub struct ScheduledTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `job` after `delay`, replacing any job still waiting.
    pub fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });

        if let Ok(mut slot) = self.handle.lock()
            && let Some(previous) = slot.replace(handle)
        {
            previous.abort();
        }
    }

    /// Cancels the waiting job. Returns true if one was pending.
    pub fn cancel(&self) -> bool {
        let Ok(mut slot) = self.handle.lock() else {
            return false;
        };
        match slot.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct SyncInner {
    store: Arc<CapacityStore>,
    ranking: Arc<dyn RankingStore>,
    cache: Arc<LeaderboardCache>,
    events: broadcast::Sender<EngineEvent>,
    /// Bumped on every local change.
    changes: AtomicU64,
    /// Last change count known to be in the ranking store.
    synced: AtomicU64,
}

impl SyncInner {
    fn is_dirty(&self) -> bool {
        self.changes.load(Ordering::SeqCst) != self.synced.load(Ordering::SeqCst)
    }

    /// Uploads the current score. Changes made while the write is in flight,
    /// or a failed write, leave the state dirty for the next attempt.
    async fn push(&self) -> Result<(), SyncError> {
        let version = self.changes.load(Ordering::SeqCst);
        let record = self.store.snapshot().await;
        let entry = build_entry(&record, Utc::now());

        match self.ranking.upsert_entry(&entry).await {
            Ok(()) => {
                self.synced.fetch_max(version, Ordering::SeqCst);
                self.cache.invalidate().await;
                log::info!(
                    "Synced score for {}: total {:.0}, wilks {:?}",
                    entry.user_id,
                    entry.total_score,
                    entry.wilks_score
                );
                let _ = self.events.send(EngineEvent::Synced {
                    total_score: entry.total_score,
                    wilks_score: entry.wilks_score,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("Score sync failed, local state kept: {}", e);
                let _ = self.events.send(EngineEvent::SyncFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

/// Schedules score uploads after local changes settle.
pub struct SyncScheduler {
    inner: Arc<SyncInner>,
    debounce: Duration,
    task: ScheduledTask,
}

impl SyncScheduler {
    pub fn new(
        store: Arc<CapacityStore>,
        ranking: Arc<dyn RankingStore>,
        cache: Arc<LeaderboardCache>,
        events: broadcast::Sender<EngineEvent>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                ranking,
                cache,
                events,
                changes: AtomicU64::new(0),
                synced: AtomicU64::new(0),
            }),
            debounce,
            task: ScheduledTask::new(),
        }
    }

    /// Marks the score as changed and restarts the debounce timer.
    pub fn notify_changed(&self) {
        self.inner.changes.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();
        self.task.schedule(self.debounce, async move {
            let _ = inner.push().await;
        });
        log::debug!("Score sync scheduled in {:?}", self.debounce);
    }

    /// Cancels the timer and uploads immediately if anything changed.
    ///
    /// Returns whether a write was made.
    pub async fn flush_now(&self) -> Result<bool, SyncError> {
        self.task.cancel();
        if !self.inner.is_dirty() {
            return Ok(false);
        }
        self.inner.push().await.map(|()| true)
    }

    pub fn is_pending(&self) -> bool {
        self.task.is_pending()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// Drops any pending upload without running it.
    pub fn shutdown(&self) {
        if self.task.cancel() {
            log::info!("Cancelled pending score sync");
        }
    }
}
