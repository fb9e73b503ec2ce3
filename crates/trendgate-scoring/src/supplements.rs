//! Uncertainty band and driver labels reported alongside a score.

use trendgate_core::{FeatureVector, TcsWeights};

use crate::features::mean;

/// Below this many observations the band falls back to a flat sparse width.
const SPARSE_SIGNAL_COUNT: usize = 3;
const SPARSE_BAND_CAP: f64 = 25.0;
const CV_SCALE: f64 = 15.0;
const CV_FLOOR: f64 = 5.0;
const MAX_DRIVERS: usize = 3;

/// Labels in feature declaration order; ties keep this order.
const DRIVER_LABELS: [&str; 5] = [
    "social_velocity",
    "persistence",
    "geo_spread",
    "creator_quality",
    "commerce_acceleration",
];

/// Half-width of the uncertainty band around `tcs`, in TCS points.
///
/// Sparse evidence gives `min(25, tcs / 2)`. Otherwise the band widens with
/// the coefficient of variation of the observed values and is capped at a
/// third of the score.
#[must_use]
pub fn uncertainty_band(tcs: u8, values: &[f64]) -> f64 {
    let tcs = f64::from(tcs);
    if values.len() < SPARSE_SIGNAL_COUNT {
        return SPARSE_BAND_CAP.min(tcs / 2.0);
    }

    let Some(avg) = mean(values) else {
        return SPARSE_BAND_CAP.min(tcs / 2.0);
    };
    let variance = mean(&values.iter().map(|v| (v - avg).powi(2)).collect::<Vec<_>>())
        .unwrap_or(0.0);
    let cv = variance.sqrt() / (avg.abs() + 1e-6);

    (cv * CV_SCALE + CV_FLOOR).min(tcs / 3.0)
}

/// Up to three driver labels for the largest positive weighted contributions.
#[must_use]
pub fn top_drivers(features: &FeatureVector, weights: &TcsWeights) -> Vec<String> {
    let mut contributions: Vec<(usize, f64)> = features
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(f, w)| f * w)
        .enumerate()
        .filter(|(_, c)| *c > 0.0)
        .collect();

    // Stable sort keeps declaration order among equal contributions.
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));

    contributions
        .into_iter()
        .take(MAX_DRIVERS)
        .map(|(i, _)| DRIVER_LABELS[i].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_band_is_half_score_capped_at_25() {
        assert!((uncertainty_band(30, &[1.0, 2.0]) - 15.0).abs() < 1e-12);
        assert!((uncertainty_band(90, &[]) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_values_give_floor_band() {
        let band = uncertainty_band(76, &[10.0, 10.0, 10.0, 10.0]);
        assert!((band - 5.0).abs() < 1e-9);
    }

    #[test]
    fn noisy_values_are_capped_at_third_of_score() {
        let band = uncertainty_band(30, &[1.0, 100.0, 1.0, 100.0]);
        assert!((band - 10.0).abs() < 1e-12);
    }

    #[test]
    fn drivers_rank_weighted_contributions() {
        let features = FeatureVector {
            velocity: 0.9,
            persistence: 0.8,
            geo_spread: 0.6,
            creator_grade: 0.7,
            commerce_delta: 0.5,
        };
        let drivers = top_drivers(&features, &TcsWeights::default());
        assert_eq!(drivers, vec!["social_velocity", "persistence", "creator_quality"]);
    }

    #[test]
    fn zero_contributions_are_not_drivers() {
        let features = FeatureVector {
            geo_spread: 1.0,
            creator_grade: 1.0,
            ..FeatureVector::default()
        };
        let drivers = top_drivers(&features, &TcsWeights::default());
        assert_eq!(drivers, vec!["geo_spread", "creator_quality"]);
        assert!(top_drivers(&FeatureVector::default(), &TcsWeights::default()).is_empty());
    }
}
