//! Muscle fatigue model: drain from completed sets and recovery over time.
//!
//! Both functions are pure. Persisting their results is the job of
//! [`crate::capacity::CapacityStore`].

use crate::catalog::ExerciseCatalog;
use crate::config::{DrainSettings, RecoverySettings};
use crate::domain::{MAX_CAPACITY, MuscleCapacity, MuscleDelta};
use crate::formulas::intensity_factor;

/// Computes how much each involved muscle's capacity drops for one set.
///
/// `weight` is the resolved load in lbs and `best_one_rep_max` the user's
/// current best estimate for the exercise, used to normalize intensity.
///
/// Returns `None` if the exercise is not in the catalog. The lookup failure is
/// logged and callers treat it as zero drain.
pub fn compute_drain(
    catalog: &ExerciseCatalog,
    settings: &DrainSettings,
    exercise: &str,
    weight: f64,
    reps: u32,
    best_one_rep_max: Option<f64>,
) -> Option<MuscleDelta> {
    let Some(definition) = catalog.get(exercise) else {
        log::warn!("Unknown exercise '{}', no drain applied", exercise);
        return None;
    };

    let percent_of_1rm = match best_one_rep_max {
        Some(best) if best > 0.0 => weight / best,
        _ => 0.0,
    };
    let intensity = intensity_factor(percent_of_1rm, reps);

    let multiplier = (definition.met * settings.met_coefficient
        + reps as f64 * settings.rep_coefficient
        + intensity * settings.intensity_coefficient)
        * settings.global_multiplier;

    log::debug!(
        "{}: {:.0} lbs x {} at {:.1}% of 1RM, intensity {}, multiplier {:.3}",
        definition.name,
        weight,
        reps,
        percent_of_1rm * 100.0,
        intensity,
        multiplier
    );

    Some(
        definition
            .involvement_shares()
            .into_iter()
            .map(|(muscle, share)| (muscle, multiplier * share * settings.scale))
            .collect(),
    )
}

/// Recovers every muscle present in `current` for `elapsed_hours`.
///
/// Each muscle gains its recovery rate (% per hour) times the elapsed hours,
/// capped at full capacity. Zero, negative or non-finite elapsed time returns
/// the input unchanged.
pub fn apply_recovery(
    current: &MuscleCapacity,
    elapsed_hours: f64,
    rates: &RecoverySettings,
) -> MuscleCapacity {
    if !elapsed_hours.is_finite() || elapsed_hours <= 0.0 {
        return current.clone();
    }

    MuscleCapacity::from_values(current.iter().map(|(muscle, value)| {
        let recovered = value + rates.rate_for(muscle) * elapsed_hours;
        (muscle, recovered.min(MAX_CAPACITY))
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::MuscleGroup;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn quads_rate(rate: f64) -> RecoverySettings {
        RecoverySettings {
            global_multiplier: 1.0,
            per_muscle: BTreeMap::from([(MuscleGroup::Quads, rate)]),
        }
    }

    #[test]
    fn test_bench_press_drain() {
        // 135 lbs × 10 against a best of 145: 93.1% → intensity 1.0
        // multiplier = 6×0.1 + 10×0.05 + 1.0×0.5 = 1.6
        let catalog = ExerciseCatalog::builtin();
        let delta = compute_drain(
            &catalog,
            &DrainSettings::default(),
            "Bench Press",
            135.0,
            10,
            Some(145.0),
        )
        .unwrap();

        assert_eq!(delta.len(), 3);
        assert!(approx_eq(delta[&MuscleGroup::Pecs], 4.8));
        assert!(approx_eq(delta[&MuscleGroup::Triceps], 1.6));
        assert!(approx_eq(delta[&MuscleGroup::AnteriorDeltoids], 1.6));
    }

    #[test]
    fn test_drain_without_best_uses_lowest_intensity() {
        // multiplier = 6×0.1 + 5×0.05 + 0.2×0.5 = 0.95
        let catalog = ExerciseCatalog::builtin();
        let delta = compute_drain(
            &catalog,
            &DrainSettings::default(),
            "Bench Press",
            135.0,
            5,
            None,
        )
        .unwrap();
        assert!(approx_eq(delta[&MuscleGroup::Pecs], 0.95 * 0.6 * 5.0));

        let zero_best = compute_drain(
            &catalog,
            &DrainSettings::default(),
            "Bench Press",
            135.0,
            5,
            Some(0.0),
        )
        .unwrap();
        assert_eq!(delta, zero_best);
    }

    #[test]
    fn test_unknown_exercise_drains_nothing() {
        let catalog = ExerciseCatalog::builtin();
        let delta = compute_drain(
            &catalog,
            &DrainSettings::default(),
            "Kettlebell Juggling",
            50.0,
            10,
            Some(100.0),
        );
        assert!(delta.is_none());
    }

    #[test]
    fn test_drain_global_multiplier() {
        let catalog = ExerciseCatalog::builtin();
        let settings = DrainSettings {
            global_multiplier: 2.0,
            ..DrainSettings::default()
        };
        let delta =
            compute_drain(&catalog, &settings, "Bench Press", 135.0, 10, Some(145.0)).unwrap();
        assert!(approx_eq(delta[&MuscleGroup::Pecs], 9.6));
    }

    #[test]
    fn test_drained_capacity_stays_in_range() {
        let catalog = ExerciseCatalog::builtin();
        let mut capacity = MuscleCapacity::fresh();
        for _ in 0..200 {
            let delta = compute_drain(
                &catalog,
                &DrainSettings::default(),
                "Squat",
                405.0,
                30,
                Some(315.0),
            )
            .unwrap();
            capacity.drain(&delta);
        }
        for (_, value) in capacity.iter() {
            assert!((0.0..=100.0).contains(&value));
        }
        assert_eq!(capacity.get(MuscleGroup::Quads), 0.0);
    }

    #[test]
    fn test_recovery_quads_ten_hours() {
        let capacity = MuscleCapacity::from_values([(MuscleGroup::Quads, 40.0)]);
        let recovered = apply_recovery(&capacity, 10.0, &quads_rate(1.2));
        assert!(approx_eq(recovered.get(MuscleGroup::Quads), 52.0));
    }

    #[test]
    fn test_recovery_capped_at_max() {
        let capacity = MuscleCapacity::from_values([(MuscleGroup::Quads, 95.0)]);
        let recovered = apply_recovery(&capacity, 48.0, &quads_rate(1.2));
        assert_eq!(recovered.get(MuscleGroup::Quads), 100.0);
    }

    #[test]
    fn test_recovery_zero_or_negative_hours_is_noop() {
        let capacity =
            MuscleCapacity::from_values([(MuscleGroup::Quads, 40.0), (MuscleGroup::Pecs, 10.0)]);
        let rates = RecoverySettings::default();
        assert_eq!(apply_recovery(&capacity, 0.0, &rates), capacity);
        assert_eq!(apply_recovery(&capacity, -5.0, &rates), capacity);
        assert_eq!(apply_recovery(&capacity, f64::NAN, &rates), capacity);
    }

    #[test]
    fn test_recovery_monotonic_in_time() {
        let capacity = MuscleCapacity::from_values(
            MuscleGroup::all().iter().map(|m| (*m, 20.0)),
        );
        let rates = RecoverySettings::default();
        let mut previous = capacity.clone();
        for step in 1..=40 {
            let hours = step as f64 * 1.5;
            let recovered = apply_recovery(&capacity, hours, &rates);
            for muscle in MuscleGroup::all() {
                assert!(recovered.get(*muscle) >= previous.get(*muscle));
                assert!(recovered.get(*muscle) <= 100.0);
            }
            previous = recovered;
        }
    }

    #[test]
    fn test_recovery_only_touches_present_muscles() {
        let capacity = MuscleCapacity::from_values([(MuscleGroup::Quads, 40.0)]);
        let recovered = apply_recovery(&capacity, 1.0, &RecoverySettings::default());
        assert_eq!(recovered.iter().count(), 1);
    }
}
