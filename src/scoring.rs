//! Strength score aggregation.
//!
//! The total score is the sum of the core lifts' capacity limits. The Wilks
//! score normalizes that total for bodyweight and gender so lifters of
//! different sizes can be ranked together.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capacity::LocalRecord;
use crate::domain::{Gender, UserProfile};
use crate::formulas::{LBS_TO_KG, calculate_wilks};
use crate::ranking::LeaderboardEntry;
use crate::records::CapacityLimits;

/// Lifts that make up the total.
pub const CORE_LIFTS: [&str; 3] = ["Bench Press", "Squat", "Deadlift"];

/// Aggregated score for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrengthScore {
    pub total_score: f64,
    /// Absent unless both bodyweight and gender are known.
    pub wilks_score: Option<f64>,
    pub bench_press_pr: f64,
    pub squat_pr: f64,
    pub deadlift_pr: f64,
}

/// Computes the score from stored limits. Missing lifts contribute 0.
pub fn calculate_score(limits: &CapacityLimits, profile: &UserProfile) -> StrengthScore {
    let lift = |name: &str| limits.get(name).unwrap_or(0.0);
    let [bench, squat, deadlift] = CORE_LIFTS.map(lift);
    let total_score = bench + squat + deadlift;

    let wilks_score = match (profile.bodyweight_lbs, profile.gender) {
        (Some(bodyweight), Some(gender)) => calculate_wilks(
            total_score * LBS_TO_KG,
            bodyweight * LBS_TO_KG,
            gender == Gender::Male,
        ),
        _ => None,
    };

    StrengthScore {
        total_score,
        wilks_score,
        bench_press_pr: bench,
        squat_pr: squat,
        deadlift_pr: deadlift,
    }
}

/// Builds the user's ranking row from the current record.
pub fn build_entry(record: &LocalRecord, now: DateTime<Utc>) -> LeaderboardEntry {
    let profile = &record.profile;
    let score = calculate_score(&record.exercise_limits, profile);

    LeaderboardEntry {
        user_id: profile.user_id.clone(),
        username: profile.username.clone(),
        total_score: score.total_score,
        wilks_score: score.wilks_score,
        bodyweight_lbs: profile.bodyweight_lbs,
        gender: profile.gender,
        country_code: profile.country_code.clone(),
        bench_press_pr: score.bench_press_pr,
        squat_pr: score.squat_pr,
        deadlift_pr: score.deadlift_pr,
        updated_at: now,
    }
}
