//! Engine settings: timing windows and fatigue model tuning.
//!
//! Settings come from an optional JSON file. Every field has a default, so a
//! partial file only overrides what it names.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::default_recovery_rate;
use crate::domain::MuscleGroup;
use crate::error::ConfigError;

/// Valid recovery rate per muscle (% per hour).
pub const RECOVERY_RATE_RANGE: (f64, f64) = (0.1, 10.0);

/// Valid global recovery multiplier.
pub const RECOVERY_MULTIPLIER_RANGE: (f64, f64) = (0.1, 5.0);

/// Valid global drain multiplier.
pub const DRAIN_MULTIPLIER_RANGE: (f64, f64) = (0.1, 3.0);

/// Recovery rate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    /// Scales the catalog default rates.
    pub global_multiplier: f64,
    /// Custom rates (% per hour). These take precedence over the scaled
    /// defaults.
    pub per_muscle: BTreeMap<MuscleGroup, f64>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            global_multiplier: 1.0,
            per_muscle: BTreeMap::new(),
        }
    }
}

impl RecoverySettings {
    /// Effective recovery rate for a muscle in % per hour.
    pub fn rate_for(&self, muscle: MuscleGroup) -> f64 {
        self.per_muscle
            .get(&muscle)
            .copied()
            .unwrap_or_else(|| default_recovery_rate(muscle) * self.global_multiplier)
    }
}

/// Coefficients of the drain formula.
///
/// ```text
/// multiplier = (met × met_coefficient + reps × rep_coefficient
///               + intensity × intensity_coefficient) × global_multiplier
/// drain      = multiplier × involvement × scale
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainSettings {
    pub met_coefficient: f64,
    pub rep_coefficient: f64,
    pub intensity_coefficient: f64,
    pub scale: f64,
    pub global_multiplier: f64,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            met_coefficient: 0.1,
            rep_coefficient: 0.05,
            intensity_coefficient: 0.5,
            scale: 5.0,
            global_multiplier: 1.0,
        }
    }
}

/// Fatigue model tuning that can be reloaded while running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub recovery: RecoverySettings,
    pub drain: DrainSettings,
}

/// All engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Leaderboard cache lifetime (default: 10 minutes).
    pub cache_ttl_secs: u64,
    /// Quiet period before a score change is written (default: 10 seconds).
    pub sync_debounce_secs: u64,
    /// Background recovery tick (default: 1 hour).
    pub recovery_interval_secs: u64,
    #[serde(flatten)]
    pub tuning: Tuning,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 600,
            sync_debounce_secs: 10,
            recovery_interval_secs: 3600,
            tuning: Tuning::default(),
        }
    }
}

impl EngineSettings {
    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "Settings file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses and validates settings from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: EngineSettings = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sync_debounce(&self) -> Duration {
        Duration::from_secs(self.sync_debounce_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs.max(1))
    }

    /// Checks every tunable against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let recovery = &self.tuning.recovery;
        let drain = &self.tuning.drain;

        check_range(
            "recovery.global_multiplier",
            recovery.global_multiplier,
            RECOVERY_MULTIPLIER_RANGE,
        )?;
        for (muscle, rate) in &recovery.per_muscle {
            check_range(
                &format!("recovery rate for {}", muscle),
                *rate,
                RECOVERY_RATE_RANGE,
            )?;
        }

        check_range(
            "drain.global_multiplier",
            drain.global_multiplier,
            DRAIN_MULTIPLIER_RANGE,
        )?;
        for (name, value) in [
            ("drain.met_coefficient", drain.met_coefficient),
            ("drain.rep_coefficient", drain.rep_coefficient),
            ("drain.intensity_coefficient", drain.intensity_coefficient),
            ("drain.scale", drain.scale),
        ] {
            check_range(name, value, (0.0, 100.0))?;
        }

        Ok(())
    }
}

fn check_range(name: &str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name: name.to_string(),
            min,
            max,
            value,
        })
    }
}
