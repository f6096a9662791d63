//! Shared ranking store: one row per user, read back ranked and filtered.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::Gender;
use crate::error::SyncError;
use crate::leaderboard::{LeaderboardQuery, LocationFilter, SortMode};

/// Most rows returned for one query.
pub const RANKING_LIMIT: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A user's row in the shared ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub username: String,
    pub total_score: f64,
    pub wilks_score: Option<f64>,
    pub bodyweight_lbs: Option<f64>,
    pub gender: Option<Gender>,
    pub country_code: Option<String>,
    pub bench_press_pr: f64,
    pub squat_pr: f64,
    pub deadlift_pr: f64,
    pub updated_at: DateTime<Utc>,
}

/// Remote store holding every user's leaderboard row.
#[async_trait]
pub trait RankingStore: Send + Sync {
    /// Inserts or replaces the row keyed by `entry.user_id`.
    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), SyncError>;

    /// Returns rows matching the query, best first.
    async fn fetch_ranked(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<Vec<LeaderboardEntry>, SyncError>;
}

/// Applies a query's filters and ordering to a set of rows.
pub fn rank_entries(
    entries: impl IntoIterator<Item = LeaderboardEntry>,
    query: &LeaderboardQuery,
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let since = query.time.since(now);
    let gender = query.score.gender();
    let country = match query.location {
        LocationFilter::Global => None,
        LocationFilter::Country => query.value.as_deref(),
    };

    let mut ranked: Vec<LeaderboardEntry> = entries
        .into_iter()
        .filter(|e| since.is_none_or(|since| e.updated_at >= since))
        .filter(|e| gender.is_none() || e.gender == gender)
        .filter(|e| {
            country.is_none_or(|code| {
                e.country_code
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
            })
        })
        .filter(|e| query.sort != SortMode::Wilks || e.wilks_score.is_some())
        .collect();

    let key = |e: &LeaderboardEntry| match query.sort {
        SortMode::Total => e.total_score,
        SortMode::Wilks => e.wilks_score.unwrap_or(0.0),
    };
    ranked.sort_by(|a, b| key(b).total_cmp(&key(a)));
    ranked.truncate(RANKING_LIMIT);
    ranked
}

/// Ranking store kept in process memory.
#[derive(Default)]
pub struct MemoryRankingStore {
    entries: Mutex<HashMap<String, LeaderboardEntry>>,
    writes: AtomicUsize,
    fetches: AtomicUsize,
    #[cfg(test)]
    fail_writes: std::sync::atomic::AtomicBool,
}

impl MemoryRankingStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn entry(&self, user_id: &str) -> Option<LeaderboardEntry> {
        self.entries.lock().ok()?.get(user_id).cloned()
    }
}

#[async_trait]
impl RankingStore for MemoryRankingStore {
    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), SyncError> {
        #[cfg(test)]
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("simulated outage".to_string()));
        }

        self.entries
            .lock()
            .map_err(|_| SyncError::Unavailable("ranking lock poisoned".to_string()))?
            .insert(entry.user_id.clone(), entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_ranked(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<Vec<LeaderboardEntry>, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let entries: Vec<LeaderboardEntry> = self
            .entries
            .lock()
            .map_err(|_| SyncError::Unavailable("ranking lock poisoned".to_string()))?
            .values()
            .cloned()
            .collect();
        Ok(rank_entries(entries, query, Utc::now()))
    }
}

/// Ranking store behind a PostgREST-style HTTP API.
///
/// Rows live in the `leaderboard` table keyed by `user_id`; filtering and
/// ordering are pushed down to the server.
pub struct RestRankingStore {
    client: Client,
    table_url: String,
    api_key: Option<String>,
}

impl RestRankingStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/leaderboard", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    /// Query-string filters for a leaderboard query.
    fn query_params(query: &LeaderboardQuery, now: DateTime<Utc>) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];

        if let Some(since) = query.time.since(now) {
            params.push(("updated_at".to_string(), format!("gte.{}", since.to_rfc3339())));
        }
        if let Some(gender) = query.score.gender() {
            params.push(("gender".to_string(), format!("eq.{}", gender)));
        }
        if query.location == LocationFilter::Country
            && let Some(code) = &query.value
        {
            params.push(("country_code".to_string(), format!("eq.{}", code)));
        }

        let order = match query.sort {
            SortMode::Total => "total_score.desc",
            SortMode::Wilks => {
                params.push(("wilks_score".to_string(), "not.is.null".to_string()));
                "wilks_score.desc"
            }
        };
        params.push(("order".to_string(), order.to_string()));
        params.push(("limit".to_string(), RANKING_LIMIT.to_string()));
        params
    }
}

#[async_trait]
impl RankingStore for RestRankingStore {
    async fn upsert_entry(&self, entry: &LeaderboardEntry) -> Result<(), SyncError> {
        let response = self
            .authorized(self.client.post(&self.table_url))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[entry])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        log::debug!("Upserted leaderboard row for {}", entry.user_id);
        Ok(())
    }

    async fn fetch_ranked(
        &self,
        query: &LeaderboardQuery,
    ) -> Result<Vec<LeaderboardEntry>, SyncError> {
        let response = self
            .authorized(self.client.get(&self.table_url))
            .query(&Self::query_params(query, Utc::now()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::{ScoreFilter, TimeFilter};

    fn entry(user_id: &str, total_score: f64, wilks_score: Option<f64>) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id: user_id.to_string(),
            username: format!("user {}", user_id),
            total_score,
            wilks_score,
            bodyweight_lbs: Some(180.0),
            gender: Some(Gender::Male),
            country_code: Some("US".to_string()),
            bench_press_pr: 0.0,
            squat_pr: 0.0,
            deadlift_pr: 0.0,
            updated_at: Utc::now(),
        }
    }

    fn ids(entries: &[LeaderboardEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.user_id.as_str()).collect()
    }

    #[test]
    fn test_rank_by_total_descending() {
        let ranked = rank_entries(
            vec![entry("a", 500.0, None), entry("b", 900.0, None), entry("c", 700.0, None)],
            &LeaderboardQuery::default(),
            Utc::now(),
        );
        assert_eq!(ids(&ranked), ["b", "c", "a"]);
    }

    #[test]
    fn test_rank_by_wilks_skips_unscored() {
        let query = LeaderboardQuery {
            sort: SortMode::Wilks,
            ..LeaderboardQuery::default()
        };
        let ranked = rank_entries(
            vec![
                entry("a", 900.0, None),
                entry("b", 500.0, Some(350.0)),
                entry("c", 700.0, Some(300.0)),
            ],
            &query,
            Utc::now(),
        );
        assert_eq!(ids(&ranked), ["b", "c"]);
    }

    #[test]
    fn test_time_gender_and_country_filters() {
        let now = Utc::now();
        let mut stale = entry("stale", 1000.0, None);
        stale.updated_at = now - chrono::Duration::days(10);
        let mut female = entry("female", 600.0, None);
        female.gender = Some(Gender::Female);
        let mut norwegian = entry("no", 800.0, None);
        norwegian.country_code = Some("NO".to_string());
        let rows = vec![stale, female, norwegian, entry("us", 700.0, None)];

        let week = LeaderboardQuery {
            time: TimeFilter::Week,
            ..LeaderboardQuery::default()
        };
        assert_eq!(ids(&rank_entries(rows.clone(), &week, now)), ["no", "us", "female"]);

        let month = LeaderboardQuery {
            time: TimeFilter::Month,
            ..LeaderboardQuery::default()
        };
        assert_eq!(rank_entries(rows.clone(), &month, now).len(), 4);

        let women = LeaderboardQuery {
            score: ScoreFilter::Female,
            ..LeaderboardQuery::default()
        };
        assert_eq!(ids(&rank_entries(rows.clone(), &women, now)), ["female"]);

        let norway = LeaderboardQuery {
            location: LocationFilter::Country,
            value: Some("no".to_string()),
            ..LeaderboardQuery::default()
        };
        assert_eq!(ids(&rank_entries(rows, &norway, now)), ["no"]);
    }

    #[test]
    fn test_rank_limit() {
        let rows = (0..150).map(|i| entry(&i.to_string(), i as f64, None));
        let ranked = rank_entries(rows, &LeaderboardQuery::default(), Utc::now());
        assert_eq!(ranked.len(), RANKING_LIMIT);
        assert_eq!(ranked[0].total_score, 149.0);
    }

    #[tokio::test]
    async fn test_memory_store_upsert_replaces_row() {
        let store = MemoryRankingStore::new();
        store.upsert_entry(&entry("a", 500.0, None)).await.unwrap();
        store.upsert_entry(&entry("a", 550.0, None)).await.unwrap();

        let ranked = store.fetch_ranked(&LeaderboardQuery::default()).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].total_score, 550.0);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_simulated_outage() {
        let store = MemoryRankingStore::new();
        store.set_fail_writes(true);
        assert!(store.upsert_entry(&entry("a", 500.0, None)).await.is_err());
        assert!(store.entry("a").is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_rest_query_params() {
        let now = Utc::now();
        let query = LeaderboardQuery {
            sort: SortMode::Wilks,
            time: TimeFilter::Week,
            location: LocationFilter::Country,
            score: ScoreFilter::Female,
            value: Some("SE".to_string()),
        };
        let params = RestRankingStore::query_params(&query, now);
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("gender"), Some("eq.female"));
        assert_eq!(get("country_code"), Some("eq.SE"));
        assert_eq!(get("wilks_score"), Some("not.is.null"));
        assert_eq!(get("order"), Some("wilks_score.desc"));
        assert_eq!(get("limit"), Some("100"));
        assert!(get("updated_at").unwrap().starts_with("gte."));

        let defaults = RestRankingStore::query_params(&LeaderboardQuery::default(), now);
        assert_eq!(defaults.len(), 3);
    }

    #[test]
    fn test_rest_store_trims_base_url() {
        let store = RestRankingStore::new("https://example.test/", None).unwrap();
        assert_eq!(store.table_url, "https://example.test/rest/v1/leaderboard");
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(entry("a", 500.0, Some(320.5))).unwrap();
        assert_eq!(json["user_id"], "a");
        assert_eq!(json["gender"], "male");
        assert_eq!(json["wilks_score"], 320.5);
    }
}
