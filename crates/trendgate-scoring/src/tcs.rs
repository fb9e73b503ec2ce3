//! Trend Confidence Score and confidence tiering.

use trendgate_core::{FeatureVector, TcsWeights, Tier, TierThresholds};

fn unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Weighted sum of the clamped features, before scaling to 0-100.
#[must_use]
pub fn weighted_sum(features: &FeatureVector, weights: &TcsWeights) -> f64 {
    features
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(f, w)| unit(w) * unit(*f))
        .sum()
}

/// `round(100 * weighted_sum)`, half away from zero, clamped to `[0, 100]`.
///
/// The scaled sum is first snapped to six decimals so binary noise such as
/// `74.49999999999999` rounds as the decimal value `74.5` would.
#[must_use]
pub fn compute_tcs(features: &FeatureVector, weights: &TcsWeights) -> u8 {
    let scaled = weighted_sum(features, weights) * 100.0;
    let snapped = (scaled * 1e6).round() / 1e6;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tcs = snapped.round().clamp(0.0, 100.0) as u8;
    tcs
}

/// `high` needs both the high signal count and score; `medium` likewise.
#[must_use]
pub fn assign_tier(tcs: u8, supporting_signals: u32, thresholds: &TierThresholds) -> Tier {
    if supporting_signals >= thresholds.high_min_signals && tcs >= thresholds.high_min_tcs {
        Tier::High
    } else if supporting_signals >= thresholds.medium_min_signals
        && tcs >= thresholds.medium_min_tcs
    {
        Tier::Medium
    } else {
        Tier::Low
    }
}
