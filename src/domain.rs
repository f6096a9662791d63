//! Domain types for muscles, capacity and logged sets.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ParseError};

/// Capacity of a fully recovered muscle.
pub const MAX_CAPACITY: f64 = 100.0;

/// Bodyweight assumed when a bodyweight-relative set is logged before the
/// user has entered one (lbs).
pub const ASSUMED_BODYWEIGHT_LBS: f64 = 180.0;

/// Heaviest load a set or a bodyweight may carry (lbs).
pub const MAX_LOAD_LBS: f64 = 2000.0;

/// Muscle groups tracked by the fatigue model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MuscleGroup {
    Pecs,
    AnteriorDeltoids,
    LateralDeltoids,
    PosteriorDeltoids,
    Biceps,
    Triceps,
    Forearms,
    Lats,
    Traps,
    LowerBack,
    Abs,
    Glutes,
    Quads,
    Hamstrings,
    Calves,
}

impl MuscleGroup {
    /// Returns all muscle group variants.
    pub fn all() -> &'static [MuscleGroup] {
        &[
            MuscleGroup::Pecs,
            MuscleGroup::AnteriorDeltoids,
            MuscleGroup::LateralDeltoids,
            MuscleGroup::PosteriorDeltoids,
            MuscleGroup::Biceps,
            MuscleGroup::Triceps,
            MuscleGroup::Forearms,
            MuscleGroup::Lats,
            MuscleGroup::Traps,
            MuscleGroup::LowerBack,
            MuscleGroup::Abs,
            MuscleGroup::Glutes,
            MuscleGroup::Quads,
            MuscleGroup::Hamstrings,
            MuscleGroup::Calves,
        ]
    }

    /// Returns the display name for the muscle group.
    pub fn display_name(&self) -> &'static str {
        match self {
            MuscleGroup::Pecs => "Pecs",
            MuscleGroup::AnteriorDeltoids => "Anterior Deltoids",
            MuscleGroup::LateralDeltoids => "Lateral Deltoids",
            MuscleGroup::PosteriorDeltoids => "Posterior Deltoids",
            MuscleGroup::Biceps => "Biceps",
            MuscleGroup::Triceps => "Triceps",
            MuscleGroup::Forearms => "Forearms",
            MuscleGroup::Lats => "Lats",
            MuscleGroup::Traps => "Traps",
            MuscleGroup::LowerBack => "Lower Back",
            MuscleGroup::Abs => "Abs",
            MuscleGroup::Glutes => "Glutes",
            MuscleGroup::Quads => "Quads",
            MuscleGroup::Hamstrings => "Hamstrings",
            MuscleGroup::Calves => "Calves",
        }
    }
}

impl FromStr for MuscleGroup {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accepts "anteriorDeltoids", "anterior_deltoids" and "Anterior Deltoids".
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        MuscleGroup::all()
            .iter()
            .copied()
            .find(|m| {
                m.display_name()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .map(|c| c.to_ascii_lowercase())
                    .eq(key.chars())
            })
            .ok_or_else(|| ParseError::UnknownMuscle(s.to_string()))
    }
}

impl std::fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Per-muscle capacity change produced by a single set.
pub type MuscleDelta = BTreeMap<MuscleGroup, f64>;

/// Current capacity of each muscle, 0 (exhausted) to 100 (fresh).
///
/// Missing entries read as fresh, and every read and write is clamped to
/// `[0, MAX_CAPACITY]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MuscleCapacity(BTreeMap<MuscleGroup, f64>);

impl Default for MuscleCapacity {
    fn default() -> Self {
        Self::fresh()
    }
}

impl MuscleCapacity {
    /// Every muscle at full capacity.
    pub fn fresh() -> Self {
        Self(
            MuscleGroup::all()
                .iter()
                .map(|m| (*m, MAX_CAPACITY))
                .collect(),
        )
    }

    /// Builds a capacity map from explicit values, clamping each one.
    pub fn from_values(values: impl IntoIterator<Item = (MuscleGroup, f64)>) -> Self {
        let mut capacity = Self(BTreeMap::new());
        for (muscle, value) in values {
            capacity.set(muscle, value);
        }
        capacity
    }

    pub fn get(&self, muscle: MuscleGroup) -> f64 {
        self.0
            .get(&muscle)
            .map_or(MAX_CAPACITY, |v| clamp_capacity(*v))
    }

    pub fn set(&mut self, muscle: MuscleGroup, value: f64) {
        self.0.insert(muscle, clamp_capacity(value));
    }

    /// Subtracts a drain delta, flooring each muscle at zero.
    pub fn drain(&mut self, delta: &MuscleDelta) {
        for (muscle, amount) in delta {
            let current = self.get(*muscle);
            self.set(*muscle, current - amount);
        }
    }

    /// Iterates over the muscles present in this map with clamped values.
    pub fn iter(&self) -> impl Iterator<Item = (MuscleGroup, f64)> + '_ {
        self.0.iter().map(|(m, v)| (*m, clamp_capacity(*v)))
    }

    /// Lowest capacity across all muscles, with the muscle it belongs to.
    pub fn most_fatigued(&self) -> Option<(MuscleGroup, f64)> {
        self.iter().min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn clamp_capacity(value: f64) -> f64 {
    if value.is_nan() {
        return MAX_CAPACITY;
    }
    value.clamp(0.0, MAX_CAPACITY)
}

/// Binary classification used by the Wilks formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            _ => Err(ParseError::InvalidGender(s.to_string())),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// The local user's identity and body data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub bodyweight_lbs: Option<f64>,
    pub gender: Option<Gender>,
    pub country_code: Option<String>,
}

/// A weight as entered for a set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightToken {
    /// A plain load in lbs.
    Absolute(f64),
    /// The user's own bodyweight.
    Bodyweight,
    /// Bodyweight plus (or minus, for assisted movements) a load.
    BodyweightOffset(f64),
}

impl FromStr for WeightToken {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let invalid = || ParseError::InvalidWeight(s.to_string());

        if token.eq_ignore_ascii_case("bodyweight") || token.eq_ignore_ascii_case("bw") {
            return Ok(WeightToken::Bodyweight);
        }

        let parse_load = |raw: &str| -> Result<f64, ParseError> {
            let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
            if value.is_finite() && value >= 0.0 {
                Ok(value)
            } else {
                Err(invalid())
            }
        };

        if let Some(rest) = token.strip_prefix('+') {
            return parse_load(rest).map(WeightToken::BodyweightOffset);
        }
        if let Some(rest) = token.strip_prefix('-') {
            return parse_load(rest).map(|v| WeightToken::BodyweightOffset(-v));
        }

        parse_load(token).map(WeightToken::Absolute)
    }
}

impl WeightToken {
    /// Resolves the token to a load in lbs.
    pub fn resolve(&self, bodyweight_lbs: Option<f64>) -> f64 {
        match self {
            WeightToken::Absolute(value) => *value,
            WeightToken::Bodyweight => known_bodyweight(bodyweight_lbs),
            WeightToken::BodyweightOffset(offset) => {
                (known_bodyweight(bodyweight_lbs) + offset).max(0.0)
            }
        }
    }
}

fn known_bodyweight(bodyweight_lbs: Option<f64>) -> f64 {
    match bodyweight_lbs {
        Some(bw) if bw > 0.0 => bw,
        _ => {
            log::warn!(
                "Bodyweight unknown, assuming {} lbs for bodyweight-relative set",
                ASSUMED_BODYWEIGHT_LBS
            );
            ASSUMED_BODYWEIGHT_LBS
        }
    }
}

/// Resolves a raw weight string, falling back to 0 for malformed input.
pub fn resolve_weight(raw: &str, bodyweight_lbs: Option<f64>) -> f64 {
    match raw.parse::<WeightToken>() {
        Ok(token) => token.resolve(bodyweight_lbs),
        Err(e) => {
            log::warn!("{}, treating as 0 lbs", e);
            0.0
        }
    }
}

/// A logged set. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSet {
    pub exercise: String,
    pub weight: f64,
    pub reps: u32,
    pub timestamp: DateTime<Utc>,
}

impl CompletedSet {
    /// Creates a new set. Fails if `reps` is zero or the load is not a
    /// finite weight up to [`MAX_LOAD_LBS`].
    pub fn new(
        exercise: impl Into<String>,
        weight: f64,
        reps: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if reps == 0 {
            return Err(EngineError::InvalidReps);
        }
        if !weight.is_finite() || weight > MAX_LOAD_LBS {
            return Err(ParseError::InvalidWeight(weight.to_string()).into());
        }

        Ok(Self {
            exercise: exercise.into(),
            weight: weight.max(0.0),
            reps,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muscle_from_str_variants() {
        assert_eq!(MuscleGroup::from_str("quads").unwrap(), MuscleGroup::Quads);
        assert_eq!(
            MuscleGroup::from_str("anteriorDeltoids").unwrap(),
            MuscleGroup::AnteriorDeltoids
        );
        assert_eq!(
            MuscleGroup::from_str("lower_back").unwrap(),
            MuscleGroup::LowerBack
        );
        assert_eq!(
            MuscleGroup::from_str("Posterior Deltoids").unwrap(),
            MuscleGroup::PosteriorDeltoids
        );
    }

    #[test]
    fn test_muscle_from_str_invalid() {
        assert!(MuscleGroup::from_str("spleen").is_err());
        assert!(MuscleGroup::from_str("").is_err());
    }

    #[test]
    fn test_fifteen_muscle_groups() {
        assert_eq!(MuscleGroup::all().len(), 15);
    }

    #[test]
    fn test_capacity_serializes_camel_case() {
        let capacity = MuscleCapacity::from_values([(MuscleGroup::AnteriorDeltoids, 42.0)]);
        let json = serde_json::to_string(&capacity).unwrap();
        assert_eq!(json, r#"{"anteriorDeltoids":42.0}"#);
    }

    #[test]
    fn test_capacity_rejects_unknown_muscle() {
        let parsed: Result<MuscleCapacity, _> = serde_json::from_str(r#"{"spleen": 50.0}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_capacity_missing_defaults_to_fresh() {
        let capacity = MuscleCapacity::from_values([(MuscleGroup::Quads, 40.0)]);
        assert_eq!(capacity.get(MuscleGroup::Quads), 40.0);
        assert_eq!(capacity.get(MuscleGroup::Calves), MAX_CAPACITY);
    }

    #[test]
    fn test_capacity_clamps_reads_and_writes() {
        let stored: MuscleCapacity =
            serde_json::from_str(r#"{"quads": 140.0, "lats": -3.0}"#).unwrap();
        assert_eq!(stored.get(MuscleGroup::Quads), 100.0);
        assert_eq!(stored.get(MuscleGroup::Lats), 0.0);

        let mut capacity = MuscleCapacity::fresh();
        capacity.drain(&MuscleDelta::from([(MuscleGroup::Pecs, 250.0)]));
        assert_eq!(capacity.get(MuscleGroup::Pecs), 0.0);
    }

    #[test]
    fn test_most_fatigued() {
        let capacity =
            MuscleCapacity::from_values([(MuscleGroup::Quads, 40.0), (MuscleGroup::Pecs, 70.0)]);
        assert_eq!(capacity.most_fatigued(), Some((MuscleGroup::Quads, 40.0)));
    }

    #[test]
    fn test_weight_token_parsing() {
        assert_eq!(
            WeightToken::from_str("135").unwrap(),
            WeightToken::Absolute(135.0)
        );
        assert_eq!(
            WeightToken::from_str("Bodyweight").unwrap(),
            WeightToken::Bodyweight
        );
        assert_eq!(
            WeightToken::from_str("+20").unwrap(),
            WeightToken::BodyweightOffset(20.0)
        );
        assert_eq!(
            WeightToken::from_str("-30").unwrap(),
            WeightToken::BodyweightOffset(-30.0)
        );
        assert!(WeightToken::from_str("heavy").is_err());
        assert!(WeightToken::from_str("+").is_err());
    }

    #[test]
    fn test_weight_token_resolution() {
        assert_eq!(WeightToken::Bodyweight.resolve(Some(170.0)), 170.0);
        assert_eq!(WeightToken::BodyweightOffset(20.0).resolve(Some(170.0)), 190.0);
        assert_eq!(WeightToken::BodyweightOffset(-30.0).resolve(Some(170.0)), 140.0);
        assert_eq!(
            WeightToken::Bodyweight.resolve(None),
            ASSUMED_BODYWEIGHT_LBS
        );
    }

    #[test]
    fn test_resolve_weight_malformed_falls_back_to_zero() {
        assert_eq!(resolve_weight("12kg", Some(170.0)), 0.0);
        assert_eq!(resolve_weight("+20", Some(170.0)), 190.0);
    }

    #[test]
    fn test_completed_set_requires_reps() {
        let now = Utc::now();
        assert!(matches!(
            CompletedSet::new("Squat", 225.0, 0, now),
            Err(EngineError::InvalidReps)
        ));
        assert!(CompletedSet::new("Squat", 225.0, 5, now).is_ok());
    }

    #[test]
    fn test_completed_set_rejects_impossible_load() {
        let now = Utc::now();
        let weight = resolve_weight("1e308", None);
        assert!(matches!(
            CompletedSet::new("Squat", weight, 30, now),
            Err(EngineError::Parse(ParseError::InvalidWeight(_)))
        ));
        assert!(CompletedSet::new("Squat", f64::INFINITY, 1, now).is_err());
        assert!(CompletedSet::new("Squat", MAX_LOAD_LBS, 1, now).is_ok());
    }

    #[test]
    fn test_gender_from_str() {
        assert_eq!(Gender::from_str("Female").unwrap(), Gender::Female);
        assert_eq!(Gender::from_str("m").unwrap(), Gender::Male);
        assert!(Gender::from_str("other").is_err());
    }
}
