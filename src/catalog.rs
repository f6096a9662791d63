//! Built-in exercise catalog.
//!
//! Each exercise lists its selectable weights and reps, a MET value and the
//! share of work each muscle group performs. The catalog also carries the
//! default recovery rate of every muscle group and the 1RM seeds used before a
//! user has logged anything.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock};

use crate::domain::MuscleGroup;

/// Involvement totals within this distance of 1.0 are used as-is.
const INVOLVEMENT_TOLERANCE: f64 = 0.01;

/// Selectable weights for an exercise.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightDomain {
    /// External load from `min` to `max` lbs.
    Loaded { min: f64, max: f64, step: f64 },
    /// Bodyweight movement with optional added load or assistance.
    Bodyweight {
        max_assist: f64,
        max_added: f64,
        step: f64,
    },
}

impl WeightDomain {
    /// Returns the ordered list of weight tokens a user can select.
    pub fn options(&self) -> Vec<String> {
        match self {
            WeightDomain::Loaded { min, max, step } => steps(*min, *max, *step)
                .into_iter()
                .map(|w| format!("{}", w))
                .collect(),
            WeightDomain::Bodyweight {
                max_assist,
                max_added,
                step,
            } => {
                let mut options: Vec<String> = steps(*step, *max_assist, *step)
                    .into_iter()
                    .rev()
                    .map(|w| format!("-{}", w))
                    .collect();
                options.push("Bodyweight".to_string());
                options.extend(
                    steps(*step, *max_added, *step)
                        .into_iter()
                        .map(|w| format!("+{}", w)),
                );
                options
            }
        }
    }
}

fn steps(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || start > end {
        return Vec::new();
    }
    let count = ((end - start) / step).floor() as usize;
    (0..=count).map(|i| start + step * i as f64).collect()
}

/// An immutable catalog entry.
#[derive(Debug, Clone)]
pub struct ExerciseDefinition {
    pub name: &'static str,
    pub weight_domain: WeightDomain,
    pub rep_domain: RangeInclusive<u32>,
    /// Metabolic equivalent of the movement.
    pub met: f64,
    /// Muscle group to fraction of work performed.
    pub involvement: &'static [(MuscleGroup, f64)],
    /// Seed for the user's capacity limit (lbs).
    pub default_one_rep_max: f64,
}

impl ExerciseDefinition {
    /// Returns the involvement of each muscle as a share of the total.
    ///
    /// Totals that are not close to 1.0 are treated as relative weights and
    /// normalized.
    pub fn involvement_shares(&self) -> Vec<(MuscleGroup, f64)> {
        let total: f64 = self.involvement.iter().map(|(_, f)| f.max(0.0)).sum();
        if total <= 0.0 {
            return Vec::new();
        }

        let scale = if (total - 1.0).abs() <= INVOLVEMENT_TOLERANCE {
            1.0
        } else {
            1.0 / total
        };

        self.involvement
            .iter()
            .map(|(m, f)| (*m, f.max(0.0) * scale))
            .collect()
    }
}

/// Lookup over a set of exercise definitions.
#[derive(Debug, Clone)]
pub struct ExerciseCatalog {
    exercises: BTreeMap<&'static str, ExerciseDefinition>,
}

static BUILTIN: LazyLock<Arc<ExerciseCatalog>> =
    LazyLock::new(|| Arc::new(ExerciseCatalog::new(builtin_exercises())));

impl ExerciseCatalog {
    pub fn new(exercises: Vec<ExerciseDefinition>) -> Self {
        Self {
            exercises: exercises.into_iter().map(|e| (e.name, e)).collect(),
        }
    }

    /// Shared instance of the built-in catalog.
    pub fn builtin() -> Arc<ExerciseCatalog> {
        BUILTIN.clone()
    }

    /// Looks up an exercise by name, ignoring case and surrounding whitespace.
    pub fn get(&self, name: &str) -> Option<&ExerciseDefinition> {
        let name = name.trim();
        self.exercises.get(name).or_else(|| {
            self.exercises
                .values()
                .find(|e| e.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseDefinition> {
        self.exercises.values()
    }

    /// Capacity limits a new user starts with.
    pub fn default_limits(&self) -> BTreeMap<String, f64> {
        self.exercises
            .values()
            .map(|e| (e.name.to_string(), e.default_one_rep_max))
            .collect()
    }
}

/// Default recovery rate of a muscle group in % per hour.
///
/// Larger muscle groups recover more slowly.
pub fn default_recovery_rate(muscle: MuscleGroup) -> f64 {
    match muscle {
        MuscleGroup::Quads | MuscleGroup::Hamstrings | MuscleGroup::Glutes => 1.2,
        MuscleGroup::Pecs | MuscleGroup::Lats => 1.3,
        MuscleGroup::LowerBack => 1.0,
        MuscleGroup::Traps => 1.5,
        MuscleGroup::AnteriorDeltoids
        | MuscleGroup::LateralDeltoids
        | MuscleGroup::PosteriorDeltoids => 1.8,
        MuscleGroup::Biceps | MuscleGroup::Triceps => 2.0,
        MuscleGroup::Forearms | MuscleGroup::Abs | MuscleGroup::Calves => 2.5,
    }
}

const fn loaded(min: f64, max: f64, step: f64) -> WeightDomain {
    WeightDomain::Loaded { min, max, step }
}

const fn bodyweight(max_assist: f64, max_added: f64) -> WeightDomain {
    WeightDomain::Bodyweight {
        max_assist,
        max_added,
        step: 5.0,
    }
}

fn builtin_exercises() -> Vec<ExerciseDefinition> {
    use MuscleGroup::*;

    vec![
        ExerciseDefinition {
            name: "Bench Press",
            weight_domain: loaded(45.0, 500.0, 5.0),
            rep_domain: 1..=30,
            met: 6.0,
            involvement: &[(Pecs, 0.6), (Triceps, 0.2), (AnteriorDeltoids, 0.2)],
            default_one_rep_max: 135.0,
        },
        ExerciseDefinition {
            name: "Incline Bench Press",
            weight_domain: loaded(45.0, 400.0, 5.0),
            rep_domain: 1..=30,
            met: 6.0,
            involvement: &[(Pecs, 0.5), (AnteriorDeltoids, 0.3), (Triceps, 0.2)],
            default_one_rep_max: 115.0,
        },
        ExerciseDefinition {
            name: "Overhead Press",
            weight_domain: loaded(45.0, 300.0, 5.0),
            rep_domain: 1..=30,
            met: 5.0,
            involvement: &[
                (AnteriorDeltoids, 0.45),
                (LateralDeltoids, 0.2),
                (Triceps, 0.25),
                (Traps, 0.1),
            ],
            default_one_rep_max: 95.0,
        },
        ExerciseDefinition {
            name: "Squat",
            weight_domain: loaded(45.0, 700.0, 5.0),
            rep_domain: 1..=30,
            met: 6.0,
            involvement: &[
                (Quads, 0.5),
                (Glutes, 0.3),
                (Hamstrings, 0.1),
                (LowerBack, 0.1),
            ],
            default_one_rep_max: 185.0,
        },
        ExerciseDefinition {
            name: "Front Squat",
            weight_domain: loaded(45.0, 500.0, 5.0),
            rep_domain: 1..=30,
            met: 6.0,
            involvement: &[(Quads, 0.6), (Glutes, 0.2), (Abs, 0.1), (LowerBack, 0.1)],
            default_one_rep_max: 155.0,
        },
        ExerciseDefinition {
            name: "Deadlift",
            weight_domain: loaded(45.0, 800.0, 5.0),
            rep_domain: 1..=30,
            met: 6.0,
            involvement: &[
                (Hamstrings, 0.3),
                (Glutes, 0.25),
                (LowerBack, 0.25),
                (Traps, 0.1),
                (Forearms, 0.1),
            ],
            default_one_rep_max: 225.0,
        },
        ExerciseDefinition {
            name: "Romanian Deadlift",
            weight_domain: loaded(45.0, 500.0, 5.0),
            rep_domain: 1..=30,
            met: 5.0,
            involvement: &[(Hamstrings, 0.5), (Glutes, 0.3), (LowerBack, 0.2)],
            default_one_rep_max: 165.0,
        },
        ExerciseDefinition {
            name: "Barbell Row",
            weight_domain: loaded(45.0, 400.0, 5.0),
            rep_domain: 1..=30,
            met: 5.0,
            involvement: &[
                (Lats, 0.45),
                (Traps, 0.2),
                (PosteriorDeltoids, 0.15),
                (Biceps, 0.2),
            ],
            default_one_rep_max: 135.0,
        },
        ExerciseDefinition {
            name: "Pull Up",
            weight_domain: bodyweight(100.0, 100.0),
            rep_domain: 1..=30,
            met: 8.0,
            involvement: &[(Lats, 0.6), (Biceps, 0.25), (Forearms, 0.15)],
            default_one_rep_max: 200.0,
        },
        ExerciseDefinition {
            name: "Dip",
            weight_domain: bodyweight(100.0, 100.0),
            rep_domain: 1..=30,
            met: 8.0,
            involvement: &[(Triceps, 0.5), (Pecs, 0.35), (AnteriorDeltoids, 0.15)],
            default_one_rep_max: 200.0,
        },
        ExerciseDefinition {
            name: "Lat Pulldown",
            weight_domain: loaded(10.0, 300.0, 5.0),
            rep_domain: 1..=30,
            met: 4.0,
            involvement: &[(Lats, 0.7), (Biceps, 0.2), (PosteriorDeltoids, 0.1)],
            default_one_rep_max: 120.0,
        },
        ExerciseDefinition {
            name: "Bicep Curl",
            weight_domain: loaded(5.0, 150.0, 5.0),
            rep_domain: 1..=30,
            met: 3.5,
            involvement: &[(Biceps, 0.8), (Forearms, 0.2)],
            default_one_rep_max: 60.0,
        },
        ExerciseDefinition {
            name: "Tricep Extension",
            weight_domain: loaded(5.0, 150.0, 5.0),
            rep_domain: 1..=30,
            met: 3.5,
            involvement: &[(Triceps, 1.0)],
            default_one_rep_max: 60.0,
        },
        ExerciseDefinition {
            name: "Lateral Raise",
            weight_domain: loaded(5.0, 80.0, 2.5),
            rep_domain: 1..=30,
            met: 3.5,
            involvement: &[(LateralDeltoids, 0.8), (Traps, 0.2)],
            default_one_rep_max: 30.0,
        },
        ExerciseDefinition {
            name: "Leg Press",
            weight_domain: loaded(90.0, 1000.0, 10.0),
            rep_domain: 1..=30,
            met: 5.0,
            involvement: &[(Quads, 0.6), (Glutes, 0.25), (Hamstrings, 0.15)],
            default_one_rep_max: 300.0,
        },
        ExerciseDefinition {
            name: "Calf Raise",
            weight_domain: loaded(0.0, 500.0, 10.0),
            rep_domain: 1..=30,
            met: 3.0,
            involvement: &[(Calves, 1.0)],
            default_one_rep_max: 200.0,
        },
        ExerciseDefinition {
            name: "Hip Thrust",
            weight_domain: loaded(45.0, 600.0, 5.0),
            rep_domain: 1..=30,
            met: 5.0,
            involvement: &[(Glutes, 0.7), (Hamstrings, 0.2), (Quads, 0.1)],
            default_one_rep_max: 185.0,
        },
        ExerciseDefinition {
            name: "Hanging Leg Raise",
            weight_domain: bodyweight(0.0, 50.0),
            rep_domain: 1..=30,
            met: 4.0,
            involvement: &[(Abs, 0.8), (Forearms, 0.2)],
            default_one_rep_max: 200.0,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_involvement_sums_to_one() {
        for exercise in ExerciseCatalog::builtin().iter() {
            let total: f64 = exercise.involvement.iter().map(|(_, f)| f).sum();
            assert!(
                (total - 1.0).abs() < 1e-9,
                "{} involvement sums to {}",
                exercise.name,
                total
            );
            assert!(exercise.met > 0.0);
            assert_eq!(exercise.rep_domain, 1..=30);
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let catalog = ExerciseCatalog::builtin();
        assert_eq!(catalog.get("bench press").unwrap().name, "Bench Press");
        assert_eq!(catalog.get("  Squat ").unwrap().name, "Squat");
        assert!(catalog.get("Underwater Basket Weaving").is_none());
    }

    #[test]
    fn test_relative_involvement_is_normalized() {
        let exercise = ExerciseDefinition {
            name: "Odd",
            weight_domain: loaded(0.0, 10.0, 5.0),
            rep_domain: 1..=30,
            met: 1.0,
            involvement: &[(MuscleGroup::Quads, 3.0), (MuscleGroup::Glutes, 1.0)],
            default_one_rep_max: 10.0,
        };
        let shares = exercise.involvement_shares();
        assert_eq!(shares[0], (MuscleGroup::Quads, 0.75));
        assert_eq!(shares[1], (MuscleGroup::Glutes, 0.25));
    }

    #[test]
    fn test_bodyweight_weight_options() {
        let domain = WeightDomain::Bodyweight {
            max_assist: 10.0,
            max_added: 10.0,
            step: 5.0,
        };
        assert_eq!(
            domain.options(),
            vec!["-10", "-5", "Bodyweight", "+5", "+10"]
        );
    }

    #[test]
    fn test_loaded_weight_options() {
        let options = loaded(45.0, 55.0, 5.0).options();
        assert_eq!(options, vec!["45", "50", "55"]);
    }

    #[test]
    fn test_default_limits_seeded_from_catalog() {
        let limits = ExerciseCatalog::builtin().default_limits();
        assert_eq!(limits.get("Bench Press"), Some(&135.0));
        assert_eq!(limits.get("Squat"), Some(&185.0));
    }

    #[test]
    fn test_every_muscle_has_recovery_rate() {
        for muscle in MuscleGroup::all() {
            let rate = default_recovery_rate(*muscle);
            assert!((0.1..=10.0).contains(&rate));
        }
    }
}
