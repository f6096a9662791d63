//! One-rep-max estimation and personal record tracking.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::ExerciseCatalog;
use crate::domain::CompletedSet;
use crate::formulas::calculate_e1rm;

/// Best estimated 1RM per exercise (lbs).
///
/// Limits only ever increase, except through [`CapacityLimits::reset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapacityLimits(BTreeMap<String, f64>);

impl CapacityLimits {
    /// Limits seeded with the catalog defaults.
    pub fn seeded(catalog: &ExerciseCatalog) -> Self {
        Self(catalog.default_limits())
    }

    /// The stored limit for an exercise, if any.
    pub fn get(&self, exercise: &str) -> Option<f64> {
        self.0.get(exercise).copied()
    }

    /// The stored limit, falling back to the catalog default.
    pub fn current_best(&self, catalog: &ExerciseCatalog, exercise: &str) -> Option<f64> {
        let canonical = canonical_name(catalog, exercise);
        self.get(&canonical)
            .or_else(|| catalog.get(exercise).map(|e| e.default_one_rep_max))
    }

    /// Replaces every limit with the catalog defaults.
    pub fn reset(&mut self, catalog: &ExerciseCatalog) {
        *self = Self::seeded(catalog);
    }

    fn raise(&mut self, exercise: String, value: f64) {
        self.0.insert(exercise, value);
    }
}

/// A new best estimate for an exercise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalRecord {
    pub exercise: String,
    pub previous: Option<f64>,
    pub estimated: f64,
}

/// Estimates 1RM for a set. Unknown exercises estimate to 0.
pub fn estimate_one_rep_max(catalog: &ExerciseCatalog, set: &CompletedSet) -> f64 {
    if catalog.get(&set.exercise).is_none() {
        log::warn!("Unknown exercise '{}', no 1RM estimate", set.exercise);
        return 0.0;
    }
    calculate_e1rm(set.weight, set.reps)
}

/// Compares a set's estimate against the stored limit and raises the limit if
/// the estimate is strictly greater.
pub fn check_personal_record(
    catalog: &ExerciseCatalog,
    limits: &mut CapacityLimits,
    set: &CompletedSet,
) -> Option<PersonalRecord> {
    let estimated = estimate_one_rep_max(catalog, set);
    if !estimated.is_finite() || estimated <= 0.0 {
        return None;
    }

    let exercise = canonical_name(catalog, &set.exercise);
    let previous = limits.current_best(catalog, &exercise);
    if previous.is_some_and(|best| estimated <= best) {
        return None;
    }

    log::info!(
        "New personal record: {} {:.0} lbs (was {:?})",
        exercise,
        estimated,
        previous
    );
    limits.raise(exercise.clone(), estimated);

    Some(PersonalRecord {
        exercise,
        previous,
        estimated,
    })
}

/// Scans historical sets and raises every limit that history beats.
///
/// Returns the number of exercises whose limit changed.
pub fn recompute_from_history(
    catalog: &ExerciseCatalog,
    limits: &mut CapacityLimits,
    history: &[CompletedSet],
) -> usize {
    let best_by_exercise: HashMap<String, f64> = history
        .par_iter()
        .filter(|set| catalog.get(&set.exercise).is_some())
        .fold(HashMap::new, |mut best: HashMap<String, f64>, set| {
            let estimate = calculate_e1rm(set.weight, set.reps);
            let entry = best.entry(canonical_name(catalog, &set.exercise)).or_default();
            *entry = entry.max(estimate);
            best
        })
        .reduce(HashMap::new, |mut a, b| {
            for (exercise, estimate) in b {
                let entry = a.entry(exercise).or_default();
                *entry = entry.max(estimate);
            }
            a
        });

    let mut updated = 0;
    for (exercise, estimate) in best_by_exercise {
        let current = limits.current_best(catalog, &exercise);
        if estimate > 0.0 && current.is_none_or(|best| estimate > best) {
            limits.raise(exercise, estimate);
            updated += 1;
        }
    }

    if updated > 0 {
        log::info!("Recomputed limits from {} sets, {} raised", history.len(), updated);
    }
    updated
}

/// Catalog spelling of an exercise name, so "bench press" and "Bench Press"
/// share one limit.
fn canonical_name(catalog: &ExerciseCatalog, exercise: &str) -> String {
    catalog
        .get(exercise)
        .map_or_else(|| exercise.trim().to_string(), |e| e.name.to_string())
}
