use chrono::{DateTime, Utc};
use trendgate_core::{Observation, SocialContentItem};

/// Per-run, per-adapter parameters handed to every query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Observation bucket for per-term aggregates (run start, hour precision).
    pub observed_at: DateTime<Utc>,
    /// Upper bound on items requested from the source for one term.
    pub limit: u32,
    pub region: String,
    pub source_confidence: f64,
}

/// Everything one term produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub observations: Vec<Observation>,
    pub content: Vec<SocialContentItem>,
}

impl SourceBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() && self.content.is_empty()
    }

    pub fn extend(&mut self, other: SourceBatch) {
        self.observations.extend(other.observations);
        self.content.extend(other.content);
    }
}
