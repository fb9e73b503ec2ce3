//! Scoring pass over the signal store.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use trendgate_core::{NewPrediction, Tier};
use trendgate_scoring::{score_entity, ScoringConfig, ScoringError};
use uuid::Uuid;

use crate::CollectorError;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntity {
    pub entity_id: String,
    pub tcs: u8,
    pub tier: Tier,
    pub supporting_signals: u32,
    /// Public id of the pending approval, `None` on a dry run.
    pub approval_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub candidates: usize,
    pub scored: Vec<ScoredEntity>,
    /// Entities skipped with the reason.
    pub skipped: Vec<(String, String)>,
}

/// `[now - window_days, now]`.
#[must_use]
pub fn score_window(now: DateTime<Utc>, window_days: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    (now - Duration::days(i64::from(window_days)), now)
}

/// Score every entity observed in the window.
///
/// With `persist` each prediction is stored with a pending approval; without
/// it nothing is written. An entity that cannot be scored is logged and
/// skipped.
///
/// # Errors
///
/// Returns [`CollectorError::Scoring`] if the configuration itself is
/// unusable, or [`CollectorError::Db`] on a store failure.
pub async fn run_scoring(
    pool: &PgPool,
    config: &ScoringConfig,
    window_days: u32,
    now: DateTime<Utc>,
    persist: bool,
) -> Result<ScoreSummary, CollectorError> {
    let (since, until) = score_window(now, window_days);
    let candidates = trendgate_db::list_scoring_candidates(pool, since, until).await?;
    tracing::info!(
        candidates = candidates.len(),
        window_days,
        persist,
        "scoring run started"
    );

    let mut summary = ScoreSummary {
        window_start: since,
        window_end: until,
        candidates: candidates.len(),
        ..ScoreSummary::default()
    };

    for entity_id in &candidates {
        let signals = trendgate_db::entity_signal_summary(pool, entity_id, since, until).await?;
        let prediction = match score_entity(&signals, config, now) {
            Ok(prediction) => prediction,
            Err(e @ ScoringError::NoObservations { .. }) => {
                tracing::warn!(entity_id = %entity_id, error = %e, "entity skipped");
                summary.skipped.push((entity_id.clone(), e.to_string()));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let approval_id = if persist {
            let (_, approval) =
                trendgate_db::insert_prediction_with_approval(pool, &prediction).await?;
            Some(approval.public_id)
        } else {
            None
        };

        tracing::info!(
            entity_id = %prediction.entity_id,
            tcs = prediction.tcs,
            tier = %prediction.tier,
            "prediction generated"
        );
        summary.scored.push(scored(&prediction, approval_id));
    }

    Ok(summary)
}

fn scored(prediction: &NewPrediction, approval_id: Option<Uuid>) -> ScoredEntity {
    ScoredEntity {
        entity_id: prediction.entity_id.clone(),
        tcs: prediction.tcs,
        tier: prediction.tier,
        supporting_signals: prediction.supporting_signals,
        approval_id,
    }
}
