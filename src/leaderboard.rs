//! Leaderboard queries and the short-lived cache of ranked snapshots.
//!
//! Entries live for the cache TTL and are dropped wholesale whenever the local
//! user's score is written, so the user sees their own new rank immediately.
//! Nothing is persisted: a cold start always misses.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::Gender;
use crate::error::{ParseError, SyncError};
use crate::ranking::{LeaderboardEntry, RankingStore};

/// Ranking order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Total,
    Wilks,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Total => "total",
            SortMode::Wilks => "wilks",
        }
    }
}

/// How recently an entry must have been updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFilter {
    #[default]
    AllTime,
    Month,
    Week,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::AllTime => "all_time",
            TimeFilter::Month => "month",
            TimeFilter::Week => "week",
        }
    }

    /// Earliest `updated_at` included by this filter.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeFilter::AllTime => None,
            TimeFilter::Month => Some(now - chrono::Duration::days(30)),
            TimeFilter::Week => Some(now - chrono::Duration::days(7)),
        }
    }
}

/// Geographic scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationFilter {
    #[default]
    Global,
    /// Restricted to the country code in the query's filter value.
    Country,
}

impl LocationFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationFilter::Global => "global",
            LocationFilter::Country => "country",
        }
    }
}

/// Division filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFilter {
    #[default]
    All,
    Male,
    Female,
}

impl ScoreFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreFilter::All => "all",
            ScoreFilter::Male => "male",
            ScoreFilter::Female => "female",
        }
    }

    /// The gender this division admits, or `None` for everyone.
    pub fn gender(&self) -> Option<Gender> {
        match self {
            ScoreFilter::All => None,
            ScoreFilter::Male => Some(Gender::Male),
            ScoreFilter::Female => Some(Gender::Female),
        }
    }
}

macro_rules! filter_from_str {
    ($ty:ident, $field:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s.trim().to_lowercase();
                [$($ty::$variant),+]
                    .into_iter()
                    .find(|variant| variant.as_str() == key)
                    .ok_or_else(|| ParseError::InvalidFilter {
                        field: $field,
                        value: s.to_string(),
                    })
            }
        }
    };
}

filter_from_str!(SortMode, "sort", [Total, Wilks]);
filter_from_str!(TimeFilter, "time", [AllTime, Month, Week]);
filter_from_str!(LocationFilter, "location", [Global, Country]);
filter_from_str!(ScoreFilter, "score", [All, Male, Female]);

/// A leaderboard request; doubles as the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default)]
    pub time: TimeFilter,
    #[serde(default)]
    pub location: LocationFilter,
    #[serde(default)]
    pub score: ScoreFilter,
    /// Extra filter argument, such as a country code.
    #[serde(default)]
    pub value: Option<String>,
}

impl LeaderboardQuery {
    /// Parses raw filter strings. Missing filters take their defaults.
    pub fn parse(
        sort: Option<&str>,
        time: Option<&str>,
        location: Option<&str>,
        score: Option<&str>,
        value: Option<&str>,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            sort: sort.map(str::parse::<SortMode>).transpose()?.unwrap_or_default(),
            time: time.map(str::parse::<TimeFilter>).transpose()?.unwrap_or_default(),
            location: location.map(str::parse::<LocationFilter>).transpose()?.unwrap_or_default(),
            score: score.map(str::parse::<ScoreFilter>).transpose()?.unwrap_or_default(),
            value: value.map(str::to_string),
        }
        .normalized())
    }

    /// Canonical form: country codes upper-cased, and the filter value
    /// dropped when the location filter does not use it.
    pub fn normalized(mut self) -> Self {
        self.value = match self.location {
            LocationFilter::Global => None,
            LocationFilter::Country => self
                .value
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty()),
        };
        self
    }
}

impl std::fmt::Display for LeaderboardQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.sort.as_str(),
            self.time.as_str(),
            self.location.as_str(),
            self.score.as_str()
        )?;
        if let Some(value) = &self.value {
            write!(f, "_{}", value)?;
        }
        Ok(())
    }
}

/// Cached snapshot for one query.
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<LeaderboardEntry>,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<LeaderboardQuery, CacheEntry>,
    /// Bumped by every invalidation.
    generation: u64,
}

/// In-memory TTL cache of ranked leaderboard snapshots.
///
/// Writers pass the generation they observed before reading the shared
/// store; a snapshot fetched across an invalidation is discarded.
pub struct LeaderboardCache {
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl LeaderboardCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns cached data while it is younger than the TTL. A stale entry is
    /// evicted and reported as a miss.
    pub async fn get(&self, query: &LeaderboardQuery) -> Option<Vec<LeaderboardEntry>> {
        let mut state = self.state.lock().await;
        let entry = state.entries.get(query)?;

        if entry.stored_at.elapsed() < self.ttl {
            return Some(entry.data.clone());
        }

        log::debug!("Leaderboard cache entry {} expired", query);
        state.entries.remove(query);
        None
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Stores a snapshot fetched at `generation`. Returns false and keeps
    /// nothing if the cache was invalidated since.
    pub async fn set(
        &self,
        query: LeaderboardQuery,
        data: Vec<LeaderboardEntry>,
        generation: u64,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            log::debug!("Dropping leaderboard snapshot {} fetched before invalidation", query);
            return false;
        }

        let ttl = self.ttl;
        state.entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        state.entries.insert(
            query,
            CacheEntry {
                data,
                stored_at: Instant::now(),
            },
        );
        true
    }

    /// Drops every cached snapshot.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if !state.entries.is_empty() {
            log::debug!("Invalidating {} leaderboard cache entries", state.entries.len());
        }
        state.entries.clear();
        state.generation += 1;
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

/// Cache-first leaderboard reads.
pub struct Leaderboard {
    cache: Arc<LeaderboardCache>,
    store: Arc<dyn RankingStore>,
}

impl Leaderboard {
    pub fn new(cache: Arc<LeaderboardCache>, store: Arc<dyn RankingStore>) -> Self {
        Self { cache, store }
    }

    /// Returns the ranked entries for a query, reading the shared store only
    /// on a cache miss.
    pub async fn ranked(
        &self,
        query: LeaderboardQuery,
    ) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let query = query.normalized();
        if let Some(cached) = self.cache.get(&query).await {
            return Ok(cached);
        }

        log::debug!("Leaderboard cache miss for {}", query);
        let generation = self.cache.generation().await;
        let data = self.store.fetch_ranked(&query).await?;
        self.cache.set(query, data.clone(), generation).await;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ranking::MemoryRankingStore;

    /// Reads its rows immediately but answers only after `delay`.
    struct SlowStore {
        inner: MemoryRankingStore,
        delay: Duration,
    }

    #[async_trait]
    impl RankingStore for SlowStore {
        async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), SyncError> {
            self.inner.upsert_entry(entry).await
        }

        async fn fetch_ranked(
            &self,
            query: &LeaderboardQuery,
        ) -> Result<Vec<LeaderboardEntry>, SyncError> {
            let rows = self.inner.fetch_ranked(query).await?;
            tokio::time::sleep(self.delay).await;
            Ok(rows)
        }
    }

    fn entry(user_id: &str, total_score: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            total_score,
            wilks_score: None,
            bodyweight_lbs: None,
            gender: None,
            country_code: None,
            bench_press_pr: 0.0,
            squat_pr: 0.0,
            deadlift_pr: 0.0,
            updated_at: Utc::now(),
        }
    }

    async fn put(cache: &LeaderboardCache, key: LeaderboardQuery, data: Vec<LeaderboardEntry>) {
        let generation = cache.generation().await;
        assert!(cache.set(key, data, generation).await);
    }

    fn total_all_time_global_all() -> LeaderboardQuery {
        LeaderboardQuery::default()
    }

    #[test]
    fn test_query_key_format() {
        assert_eq!(
            total_all_time_global_all().to_string(),
            "total_all_time_global_all"
        );

        let country = LeaderboardQuery {
            sort: SortMode::Wilks,
            time: TimeFilter::Week,
            location: LocationFilter::Country,
            score: ScoreFilter::Female,
            value: Some(" no ".to_string()),
        }
        .normalized();
        assert_eq!(country.to_string(), "wilks_week_country_female_NO");
    }

    #[test]
    fn test_parse_filters() {
        let query = LeaderboardQuery::parse(
            Some("wilks"),
            Some("MONTH"),
            Some("country"),
            Some("male"),
            Some("se"),
        )
        .unwrap();
        assert_eq!(query.sort, SortMode::Wilks);
        assert_eq!(query.time, TimeFilter::Month);
        assert_eq!(query.score, ScoreFilter::Male);
        assert_eq!(query.value.as_deref(), Some("SE"));

        assert_eq!(
            LeaderboardQuery::parse(None, None, None, None, None).unwrap(),
            LeaderboardQuery::default()
        );
    }

    #[test]
    fn test_parse_rejects_unknown_filter() {
        let err = LeaderboardQuery::parse(None, Some("decade"), None, None, None).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFilter { field: "time", .. }));
    }

    #[test]
    fn test_global_query_ignores_filter_value() {
        let query = LeaderboardQuery {
            value: Some("US".to_string()),
            ..LeaderboardQuery::default()
        }
        .normalized();
        assert_eq!(query, total_all_time_global_all());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_respects_ttl() {
        let cache = LeaderboardCache::new(Duration::from_secs(10 * 60));
        let key = total_all_time_global_all();
        put(&cache, key.clone(), vec![entry("a", 500.0)]).await;

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert_eq!(cache.get(&key).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_exactly_at_ttl() {
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        let key = total_all_time_global_all();
        put(&cache, key.clone(), vec![entry("a", 500.0)]).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_keys_are_independent() {
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        let wilks = LeaderboardQuery {
            sort: SortMode::Wilks,
            ..LeaderboardQuery::default()
        };
        put(&cache, total_all_time_global_all(), vec![entry("a", 1.0)]).await;

        assert!(cache.get(&wilks).await.is_none());
        assert!(cache.get(&total_all_time_global_all()).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_clears_everything() {
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        put(&cache, total_all_time_global_all(), vec![entry("a", 1.0)]).await;
        put(
            &cache,
            LeaderboardQuery {
                time: TimeFilter::Month,
                ..LeaderboardQuery::default()
            },
            vec![],
        )
        .await;

        cache.invalidate().await;
        assert_eq!(cache.len().await, 0);
        assert!(cache.get(&total_all_time_global_all()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaderboard_reads_store_only_on_miss() {
        let store = Arc::new(MemoryRankingStore::new());
        store.upsert_entry(&entry("a", 500.0)).await.unwrap();

        let cache = Arc::new(LeaderboardCache::new(Duration::from_secs(600)));
        let leaderboard = Leaderboard::new(cache.clone(), store.clone());

        assert_eq!(leaderboard.ranked(LeaderboardQuery::default()).await.unwrap().len(), 1);

        // Served from cache even though the store changed.
        store.upsert_entry(&entry("b", 700.0)).await.unwrap();
        assert_eq!(leaderboard.ranked(LeaderboardQuery::default()).await.unwrap().len(), 1);
        assert_eq!(store.fetch_count(), 1);

        cache.invalidate().await;
        let fresh = leaderboard.ranked(LeaderboardQuery::default()).await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].user_id, "b");
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_across_invalidation_is_not_cached() {
        let store = Arc::new(SlowStore {
            inner: MemoryRankingStore::new(),
            delay: Duration::from_secs(5),
        });
        store.upsert_entry(&entry("me", 500.0)).await.unwrap();

        let cache = Arc::new(LeaderboardCache::new(Duration::from_secs(600)));
        let leaderboard = Arc::new(Leaderboard::new(cache.clone(), store.clone()));

        let reader = leaderboard.clone();
        let in_flight =
            tokio::spawn(async move { reader.ranked(LeaderboardQuery::default()).await });

        // Score written while the read above is still waiting on the store.
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.upsert_entry(&entry("me", 900.0)).await.unwrap();
        cache.invalidate().await;

        let stale = in_flight.await.unwrap().unwrap();
        assert_eq!(stale[0].total_score, 500.0);
        assert_eq!(cache.len().await, 0);

        let fresh = leaderboard.ranked(LeaderboardQuery::default()).await.unwrap();
        assert_eq!(fresh[0].total_score, 900.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_sweeps_expired_entries() {
        let cache = LeaderboardCache::new(Duration::from_secs(60));
        for code in ["NO", "SE", "DK"] {
            let key = LeaderboardQuery {
                location: LocationFilter::Country,
                value: Some(code.to_string()),
                ..LeaderboardQuery::default()
            };
            put(&cache, key, vec![]).await;
        }
        assert_eq!(cache.len().await, 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        put(&cache, total_all_time_global_all(), vec![entry("a", 1.0)]).await;
        assert_eq!(cache.len().await, 1);
    }
}
