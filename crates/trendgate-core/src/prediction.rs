use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::states::Tier;
use crate::topics::TcsWeights;

/// The five normalized sub-signals feeding the TCS, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub velocity: f64,
    pub persistence: f64,
    pub geo_spread: f64,
    pub creator_grade: f64,
    pub commerce_delta: f64,
}

impl FeatureVector {
    #[must_use]
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.velocity,
            self.persistence,
            self.geo_spread,
            self.creator_grade,
            self.commerce_delta,
        ]
    }
}

/// A scored entity ready to be persisted together with its pending approval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPrediction {
    pub entity_id: String,
    pub regions: Vec<String>,
    pub tcs: u8,
    pub tier: Tier,
    pub supporting_signals: u32,
    pub features: FeatureVector,
    pub weights: TcsWeights,
    /// Half-width of the uncertainty band, in TCS points.
    pub uncertainty: f64,
    pub drivers: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
