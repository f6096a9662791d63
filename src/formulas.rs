//! Strength formulas for e1RM, training intensity and the Wilks score.

/// Pounds to kilograms.
pub const LBS_TO_KG: f64 = 0.453_592_37;

/// Wilks polynomial coefficients (a + b·x + c·x² + d·x³ + e·x⁴ + f·x⁵).
mod wilks {
    pub const MALE: [f64; 6] = [
        -216.047_514_4,
        16.260_633_9,
        -0.002_388_645,
        -0.001_137_32,
        7.018_63e-6,
        -1.291e-8,
    ];

    pub const FEMALE: [f64; 6] = [
        594.317_477_755_82,
        -27.238_425_364_47,
        0.821_122_268_71,
        -0.009_307_339_13,
        4.731_582e-5,
        -9.054e-8,
    ];
}

/// Calculates estimated 1RM from weight and reps using the Epley formula,
/// rounded to the nearest whole unit.
///
/// ```text
/// e1RM = round(weight × (1 + reps / 30))
/// ```
///
/// Returns 0 for non-positive weight, zero reps, or an estimate that is not a
/// finite number.
pub fn calculate_e1rm(weight: f64, reps: u32) -> f64 {
    if weight <= 0.0 || reps == 0 {
        return 0.0;
    }

    let estimate = (weight * (1.0 + reps as f64 / 30.0)).round();
    if estimate.is_finite() { estimate } else { 0.0 }
}

/// Maps load relative to the current best and the rep count to a discrete
/// intensity factor.
///
/// A single rep at 95% or more of 1RM is a max effort (1.2). Below that the
/// factor steps down every 10% from 1.0 at 90% to 0.2 under 60%.
pub fn intensity_factor(percent_of_1rm: f64, reps: u32) -> f64 {
    if reps == 1 && percent_of_1rm >= 0.95 {
        1.2
    } else if percent_of_1rm >= 0.90 {
        1.0
    } else if percent_of_1rm >= 0.80 {
        0.8
    } else if percent_of_1rm >= 0.70 {
        0.6
    } else if percent_of_1rm >= 0.60 {
        0.4
    } else {
        0.2
    }
}

/// Calculates the Wilks coefficient for a bodyweight.
///
/// Formula: coefficient = 500 / (a + b·bw + c·bw² + d·bw³ + e·bw⁴ + f·bw⁵)
///
/// Returns None if bodyweight is non-positive or the polynomial is not
/// positive.
pub fn wilks_coefficient(bodyweight_kg: f64, male: bool) -> Option<f64> {
    if bodyweight_kg <= 0.0 || !bodyweight_kg.is_finite() {
        return None;
    }

    let coefficients = if male { &wilks::MALE } else { &wilks::FEMALE };
    let denominator = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * bodyweight_kg + c);

    if denominator <= 0.0 {
        return None;
    }

    Some(500.0 / denominator)
}

/// Calculates the Wilks score for a total, rounded to two decimals.
///
/// # Arguments
/// * `total_kg` - Sum of the lifts in kilograms
/// * `bodyweight_kg` - Athlete's bodyweight in kilograms
/// * `male` - Selects the coefficient set
pub fn calculate_wilks(total_kg: f64, bodyweight_kg: f64, male: bool) -> Option<f64> {
    let coefficient = wilks_coefficient(bodyweight_kg, male)?;
    Some(round2(total_kg * coefficient))
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
