//! Durable per-user capacity record.
//!
//! [`CapacityStore`] owns the user's [`LocalRecord`] and is the only place it
//! is mutated. Every mutation is a read-modify-write under one async mutex and
//! is persisted before the in-memory copy is replaced, so a failed write
//! leaves the previous state (including `last_event_at`) intact.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::catalog::ExerciseCatalog;
use crate::config::{RecoverySettings, Tuning};
use crate::domain::{CompletedSet, MuscleCapacity, MuscleDelta, UserProfile};
use crate::error::StoreError;
use crate::fatigue::{apply_recovery, compute_drain};
use crate::records::{CapacityLimits, PersonalRecord, check_personal_record, estimate_one_rep_max};

/// Number of logged sets kept for recomputing limits.
pub const MAX_HISTORY: usize = 5000;

/// The persisted per-user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    pub profile: UserProfile,
    #[serde(default)]
    pub muscle_capacity: MuscleCapacity,
    /// Time of the last drain or recovery applied to `muscle_capacity`.
    #[serde(rename = "lastEventTimestamp")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exercise_limits: CapacityLimits,
    #[serde(default)]
    pub history: Vec<CompletedSet>,
}

impl LocalRecord {
    /// A fresh record: full capacity and catalog-seeded limits.
    pub fn new(profile: UserProfile, catalog: &ExerciseCatalog) -> Self {
        Self {
            profile,
            muscle_capacity: MuscleCapacity::fresh(),
            last_event_at: None,
            exercise_limits: CapacityLimits::seeded(catalog),
            history: Vec::new(),
        }
    }

    /// Recovers capacity up to `now` and advances `last_event_at`.
    ///
    /// Time never moves backwards: if `now` is not after the last event the
    /// capacity is left unchanged.
    fn catch_up(&mut self, rates: &RecoverySettings, now: DateTime<Utc>) {
        match self.last_event_at {
            Some(last) if now > last => {
                self.muscle_capacity = self.projected(rates, now);
                self.last_event_at = Some(now);
            }
            Some(_) => {}
            None => self.last_event_at = Some(now),
        }
    }

    /// Capacity as it would be at `now`, without advancing the record.
    pub fn projected(&self, rates: &RecoverySettings, now: DateTime<Utc>) -> MuscleCapacity {
        match self.last_event_at {
            Some(last) if now > last => {
                let elapsed_hours = (now - last).num_milliseconds() as f64 / 3_600_000.0;
                apply_recovery(&self.muscle_capacity, elapsed_hours, rates)
            }
            _ => self.muscle_capacity.clone(),
        }
    }
}

/// Persistence backend for the local record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads the record, or `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<LocalRecord>, StoreError>;

    async fn save(&self, record: &LocalRecord) -> Result<(), StoreError>;
}

/// Stores the record as a JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self) -> Result<Option<LocalRecord>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes atomically: temp file, then rename.
    async fn save(&self, record: &LocalRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(record)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

/// Keeps the record in memory only.
#[derive(Default)]
pub struct MemoryRecordStore {
    record: std::sync::Mutex<Option<LocalRecord>>,
    #[cfg(test)]
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail until cleared.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self) -> Result<Option<LocalRecord>, StoreError> {
        let guard = self
            .record
            .lock()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn save(&self, record: &LocalRecord) -> Result<(), StoreError> {
        #[cfg(test)]
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }

        let mut guard = self
            .record
            .lock()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".to_string()))?;
        *guard = Some(record.clone());
        Ok(())
    }
}

/// Result of logging a set against the store.
#[derive(Debug, Clone, Serialize)]
pub struct SetOutcome {
    pub capacity: MuscleCapacity,
    /// `None` when the exercise is not in the catalog.
    pub drain: Option<MuscleDelta>,
    pub estimated_one_rep_max: f64,
    pub personal_record: Option<PersonalRecord>,
}

/// Owner of the user's capacity, limits and history.
pub struct CapacityStore {
    backend: Arc<dyn RecordStore>,
    catalog: Arc<ExerciseCatalog>,
    record: Mutex<LocalRecord>,
}

impl CapacityStore {
    /// Opens the store, creating a fresh record on first use.
    ///
    /// The identity in `profile` replaces the stored one; stored body data
    /// is kept.
    pub async fn open(
        backend: Arc<dyn RecordStore>,
        catalog: Arc<ExerciseCatalog>,
        profile: UserProfile,
    ) -> Result<Self, StoreError> {
        let record = match backend.load().await? {
            Some(mut record) => {
                record.profile.user_id = profile.user_id;
                record.profile.username = profile.username;
                record
            }
            None => {
                log::info!("No stored record for {}, starting fresh", profile.user_id);
                let record = LocalRecord::new(profile, &catalog);
                backend.save(&record).await?;
                record
            }
        };

        Ok(Self {
            backend,
            catalog,
            record: Mutex::new(record),
        })
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    /// A copy of the current record.
    pub async fn snapshot(&self) -> LocalRecord {
        self.record.lock().await.clone()
    }

    pub async fn capacity(&self) -> MuscleCapacity {
        self.read(|record| record.muscle_capacity.clone()).await
    }

    /// Reads from the current record without copying it.
    pub async fn read<T>(&self, f: impl FnOnce(&LocalRecord) -> T) -> T {
        f(&*self.record.lock().await)
    }

    /// Applies a mutation to the record and persists it.
    ///
    /// The mutation runs on a copy; the stored record is only replaced once
    /// the backend accepted the write.
    pub async fn update<T>(
        &self,
        mutate: impl FnOnce(&mut LocalRecord, &ExerciseCatalog) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self.record.lock().await;
        let mut next = guard.clone();
        let result = mutate(&mut next, &self.catalog);

        self.backend.save(&next).await?;
        *guard = next;
        Ok(result)
    }

    /// Recovers capacity for the time elapsed since the last event.
    pub async fn apply_recovery(
        &self,
        rates: &RecoverySettings,
        now: DateTime<Utc>,
    ) -> Result<MuscleCapacity, StoreError> {
        self.update(|record, _| {
            record.catch_up(rates, now);
            record.muscle_capacity.clone()
        })
        .await
    }

    /// Applies a completed set: recovery up to the set's time, then drain,
    /// then the personal record check.
    pub async fn record_set(
        &self,
        set: CompletedSet,
        tuning: &Tuning,
    ) -> Result<SetOutcome, StoreError> {
        self.update(|record, catalog| {
            record.catch_up(&tuning.recovery, set.timestamp);

            let best = record
                .exercise_limits
                .current_best(catalog, &set.exercise);
            let drain = compute_drain(
                catalog,
                &tuning.drain,
                &set.exercise,
                set.weight,
                set.reps,
                best,
            );
            if let Some(delta) = &drain {
                record.muscle_capacity.drain(delta);
            }

            let estimated_one_rep_max = estimate_one_rep_max(catalog, &set);
            let personal_record =
                check_personal_record(catalog, &mut record.exercise_limits, &set);

            record.history.push(set);
            if record.history.len() > MAX_HISTORY {
                let excess = record.history.len() - MAX_HISTORY;
                record.history.drain(..excess);
            }

            SetOutcome {
                capacity: record.muscle_capacity.clone(),
                drain,
                estimated_one_rep_max,
                personal_record,
            }
        })
        .await
    }
}
