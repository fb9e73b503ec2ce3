//! Trend Confidence Score computation for trendgate.
//!
//! Scoring is pure: callers load an [`EntitySignalSummary`] from the store,
//! and [`score_entity`] turns it into a [`NewPrediction`] with features,
//! score, tier, uncertainty band and driver labels.

mod features;
mod supplements;
mod tcs;

use chrono::{DateTime, Utc};
use thiserror::Error;
use trendgate_core::{EntitySignalSummary, NewPrediction, TcsWeights, TierThresholds, TopicsFile};

pub use features::{extract_features, source_grade};
pub use supplements::{top_drivers, uncertainty_band};
pub use tcs::{assign_tier, compute_tcs, weighted_sum};

#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("entity {entity_id} has no observations in the scoring window")]
    NoObservations { entity_id: String },

    #[error("region universe is empty")]
    EmptyRegionUniverse,

    #[error("invalid weights: {0}")]
    InvalidWeights(String),
}

/// Weights, tier thresholds and the region universe used for `geo_spread`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub weights: TcsWeights,
    pub thresholds: TierThresholds,
    pub region_universe: Vec<String>,
}

impl ScoringConfig {
    #[must_use]
    pub fn from_topics(topics: &TopicsFile) -> Self {
        Self {
            weights: topics.scoring.weights,
            thresholds: topics.scoring.thresholds,
            region_universe: topics.region_universe.clone(),
        }
    }

    fn validate(&self) -> Result<(), ScoringError> {
        if self.region_universe.is_empty() {
            return Err(ScoringError::EmptyRegionUniverse);
        }
        let weights = self.weights.as_array();
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(ScoringError::InvalidWeights(
                "every weight must lie in [0, 1]".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(ScoringError::InvalidWeights(
                "weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Score one entity's windowed signals.
///
/// # Errors
///
/// Returns [`ScoringError::NoObservations`] for an empty summary and a
/// configuration error if the weights or region universe are unusable.
pub fn score_entity(
    summary: &EntitySignalSummary,
    config: &ScoringConfig,
    generated_at: DateTime<Utc>,
) -> Result<NewPrediction, ScoringError> {
    config.validate()?;
    if summary.observations.is_empty() {
        return Err(ScoringError::NoObservations {
            entity_id: summary.entity_id.clone(),
        });
    }

    let features = extract_features(summary, &config.region_universe);
    let tcs = compute_tcs(&features, &config.weights);
    let tier = assign_tier(tcs, summary.supporting_signals, &config.thresholds);
    let values: Vec<f64> = summary.observations.iter().map(|o| o.value).collect();
    let uncertainty = uncertainty_band(tcs, &values);
    let drivers = top_drivers(&features, &config.weights);

    tracing::debug!(
        entity_id = %summary.entity_id,
        tcs,
        tier = %tier,
        supporting_signals = summary.supporting_signals,
        "scored entity"
    );

    Ok(NewPrediction {
        entity_id: summary.entity_id.clone(),
        regions: summary.regions.clone(),
        tcs,
        tier,
        supporting_signals: summary.supporting_signals,
        features,
        weights: config.weights,
        uncertainty,
        drivers,
        generated_at,
    })
}
