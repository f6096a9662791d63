//! The engine's entry point for one user.
//!
//! A [`TrainingSession`] owns the capacity store, the leaderboard cache, the
//! sync scheduler and the hourly recovery ticker. Callers log sets and read
//! snapshots; they never compute drain, recovery or scores themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};

use crate::capacity::{CapacityStore, RecordStore, SetOutcome};
use crate::catalog::ExerciseCatalog;
use crate::config::{EngineSettings, Tuning};
use crate::domain::{
    CompletedSet, Gender, MAX_LOAD_LBS, MuscleCapacity, UserProfile, resolve_weight,
};
use crate::error::EngineError;
use crate::leaderboard::{Leaderboard, LeaderboardCache, LeaderboardQuery};
use crate::ranking::{LeaderboardEntry, RankingStore};
use crate::records::{CapacityLimits, PersonalRecord, recompute_from_history};
use crate::scoring::{StrengthScore, calculate_score};
use crate::sync::{ScheduledTask, SyncScheduler};

/// Notifications pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SetLogged {
        exercise: String,
        capacity: MuscleCapacity,
        personal_record: Option<PersonalRecord>,
    },
    CapacityRecovered {
        capacity: MuscleCapacity,
    },
    ScoresReset,
    ProfileUpdated {
        profile: UserProfile,
    },
    RecordsRecomputed {
        updated: usize,
    },
    TuningReloaded,
    Synced {
        total_score: f64,
        wilks_score: Option<f64>,
    },
    SyncFailed {
        error: String,
    },
}

/// Body data the user may change. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub bodyweight_lbs: Option<f64>,
    pub gender: Option<Gender>,
    pub country_code: Option<String>,
}

pub struct TrainingSession {
    store: Arc<CapacityStore>,
    tuning: Arc<RwLock<Tuning>>,
    leaderboard: Leaderboard,
    sync: SyncScheduler,
    ticker: ScheduledTask,
    events: broadcast::Sender<EngineEvent>,
}

impl TrainingSession {
    /// Opens the user's record and wires the session's collaborators.
    pub async fn open(
        backend: Arc<dyn RecordStore>,
        ranking: Arc<dyn RankingStore>,
        catalog: Arc<ExerciseCatalog>,
        profile: UserProfile,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(CapacityStore::open(backend, catalog, profile).await?);
        let cache = Arc::new(LeaderboardCache::new(settings.cache_ttl()));
        let (events, _) = broadcast::channel(64);

        let sync = SyncScheduler::new(
            store.clone(),
            ranking.clone(),
            cache.clone(),
            events.clone(),
            settings.sync_debounce(),
        );

        Ok(Self {
            store,
            tuning: Arc::new(RwLock::new(settings.tuning.clone())),
            leaderboard: Leaderboard::new(cache, ranking),
            sync,
            ticker: ScheduledTask::new(),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Logs a set performed now. `weight` is the raw selection from the
    /// weight domain, such as `"135"`, `"Bodyweight"` or `"+25"`.
    pub async fn log_set(
        &self,
        exercise: &str,
        weight: &str,
        reps: u32,
    ) -> Result<SetOutcome, EngineError> {
        self.log_set_at(exercise, weight, reps, Utc::now()).await
    }

    pub async fn log_set_at(
        &self,
        exercise: &str,
        weight: &str,
        reps: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<SetOutcome, EngineError> {
        // Zero reps is reported as `InvalidReps` by `CompletedSet::new`.
        if let Some(definition) = self.store.catalog().get(exercise)
            && reps > 0
            && !definition.rep_domain.contains(&reps)
        {
            return Err(EngineError::RepsOutOfRange {
                exercise: definition.name.to_string(),
                reps,
                min: *definition.rep_domain.start(),
                max: *definition.rep_domain.end(),
            });
        }

        let bodyweight = self
            .store
            .read(|record| record.profile.bodyweight_lbs)
            .await;
        let set = CompletedSet::new(exercise, resolve_weight(weight, bodyweight), reps, timestamp)?;
        let tuning = self.tuning.read().await.clone();

        let outcome = self.store.record_set(set, &tuning).await?;
        if outcome.personal_record.is_some() {
            self.sync.notify_changed();
        }

        let _ = self.events.send(EngineEvent::SetLogged {
            exercise: exercise.to_string(),
            capacity: outcome.capacity.clone(),
            personal_record: outcome.personal_record.clone(),
        });
        Ok(outcome)
    }

    /// The stored capacity, as of the last applied event.
    pub async fn capacity_snapshot(&self) -> MuscleCapacity {
        self.store.capacity().await
    }

    /// Capacity recovered up to `now` without persisting anything.
    pub async fn projected_capacity(&self, now: DateTime<Utc>) -> MuscleCapacity {
        let tuning = self.tuning.read().await;
        self.store
            .read(|record| record.projected(&tuning.recovery, now))
            .await
    }

    /// Catches recovery up to `now`. Called when the client regains focus
    /// and by the background ticker.
    pub async fn on_focus(&self, now: DateTime<Utc>) -> Result<MuscleCapacity, EngineError> {
        recover(&self.store, &self.tuning, &self.events, now).await
    }

    pub async fn score(&self) -> StrengthScore {
        self.store
            .read(|record| calculate_score(&record.exercise_limits, &record.profile))
            .await
    }

    pub async fn limits(&self) -> CapacityLimits {
        self.store.read(|record| record.exercise_limits.clone()).await
    }

    /// True while a score upload is waiting for its debounce window.
    pub fn sync_pending(&self) -> bool {
        self.sync.is_pending()
    }

    pub async fn profile(&self) -> UserProfile {
        self.store.read(|record| record.profile.clone()).await
    }

    /// Ranked leaderboard, served from cache while fresh.
    pub async fn leaderboard(
        &self,
        query: LeaderboardQuery,
    ) -> Result<Vec<LeaderboardEntry>, EngineError> {
        Ok(self.leaderboard.ranked(query).await?)
    }

    /// Resets every limit to the catalog defaults and schedules a sync.
    pub async fn reset_scores(&self) -> Result<StrengthScore, EngineError> {
        let score = self
            .store
            .update(|record, catalog| {
                record.exercise_limits.reset(catalog);
                calculate_score(&record.exercise_limits, &record.profile)
            })
            .await?;

        log::info!("Scores reset to defaults");
        self.sync.notify_changed();
        let _ = self.events.send(EngineEvent::ScoresReset);
        Ok(score)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, EngineError> {
        let profile = self
            .store
            .update(|record, _| {
                let profile = &mut record.profile;
                if let Some(username) = update.username {
                    profile.username = username;
                }
                if let Some(bodyweight) = update
                    .bodyweight_lbs
                    .filter(|bw| *bw > 0.0 && *bw <= MAX_LOAD_LBS)
                {
                    profile.bodyweight_lbs = Some(bodyweight);
                }
                if let Some(gender) = update.gender {
                    profile.gender = Some(gender);
                }
                if let Some(code) = update.country_code {
                    let code = code.trim().to_uppercase();
                    profile.country_code = (!code.is_empty()).then_some(code);
                }
                profile.clone()
            })
            .await?;

        self.sync.notify_changed();
        let _ = self.events.send(EngineEvent::ProfileUpdated {
            profile: profile.clone(),
        });
        Ok(profile)
    }

    /// Raises limits from the stored history. Returns how many changed.
    pub async fn recompute_records(&self) -> Result<usize, EngineError> {
        let updated = self
            .store
            .update(|record, catalog| {
                recompute_from_history(catalog, &mut record.exercise_limits, &record.history)
            })
            .await?;

        if updated > 0 {
            self.sync.notify_changed();
        }
        let _ = self.events.send(EngineEvent::RecordsRecomputed { updated });
        Ok(updated)
    }

    pub async fn tuning(&self) -> Tuning {
        self.tuning.read().await.clone()
    }

    /// Swaps recovery rates and drain coefficients for subsequent events.
    pub async fn apply_tuning(&self, tuning: Tuning) {
        *self.tuning.write().await = tuning;
        log::info!("Tuning reloaded");
        let _ = self.events.send(EngineEvent::TuningReloaded);
    }

    /// Starts the background recovery pass, replacing any running ticker.
    pub fn start_recovery_ticker(&self, interval: Duration) {
        let store = self.store.clone();
        let tuning = self.tuning.clone();
        let events = self.events.clone();

        self.ticker.schedule(interval, async move {
            let mut ticks = tokio::time::interval(interval);
            loop {
                ticks.tick().await;
                if let Err(e) = recover(&store, &tuning, &events, Utc::now()).await {
                    log::warn!("Background recovery failed: {}", e);
                }
            }
        });
        log::debug!("Recovery ticker running every {:?}", interval);
    }

    /// Stops background work and flushes a pending score once.
    pub async fn shutdown(&self) {
        self.ticker.cancel();
        if self.sync.is_dirty() {
            match self.sync.flush_now().await {
                Ok(_) => log::info!("Flushed pending score on shutdown"),
                Err(e) => log::warn!("Could not flush score on shutdown: {}", e),
            }
        }
        self.sync.shutdown();
    }
}

async fn recover(
    store: &CapacityStore,
    tuning: &RwLock<Tuning>,
    events: &broadcast::Sender<EngineEvent>,
    now: DateTime<Utc>,
) -> Result<MuscleCapacity, EngineError> {
    let rates = tuning.read().await.recovery.clone();
    let capacity = store.apply_recovery(&rates, now).await?;
    let _ = events.send(EngineEvent::CapacityRecovered {
        capacity: capacity.clone(),
    });
    Ok(capacity)
}
