//! Database operations for `predictions`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use trendgate_core::NewPrediction;
use uuid::Uuid;

use crate::approvals::ApprovalRecordRow;
use crate::DbError;

/// A row from the `predictions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub entity_id: String,
    pub regions: Vec<String>,
    pub tcs: i16,
    pub tier: String,
    pub supporting_signals: i32,
    pub features: serde_json::Value,
    pub weights: serde_json::Value,
    pub uncertainty: f64,
    pub drivers: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Persist a prediction together with its `pending` approval record.
///
/// Both rows are written in one transaction, so a prediction never exists
/// without its gate.
///
/// # Errors
///
/// Returns [`DbError::Serialization`] if features or weights cannot be
/// encoded, or [`DbError::Sqlx`] if either insert fails.
pub async fn insert_prediction_with_approval(
    pool: &PgPool,
    prediction: &NewPrediction,
) -> Result<(PredictionRow, ApprovalRecordRow), DbError> {
    let features = serde_json::to_value(prediction.features)?;
    let weights = serde_json::to_value(prediction.weights)?;
    let supporting_signals =
        i32::try_from(prediction.supporting_signals).map_err(|e| DbError::InvalidValue {
            field: "supporting_signals",
            reason: e.to_string(),
        })?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, PredictionRow>(
        "INSERT INTO predictions \
             (public_id, entity_id, regions, tcs, tier, supporting_signals, \
              features, weights, uncertainty, drivers, generated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING id, public_id, entity_id, regions, tcs, tier, supporting_signals, \
                   features, weights, uncertainty, drivers, generated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&prediction.entity_id)
    .bind(&prediction.regions)
    .bind(i16::from(prediction.tcs))
    .bind(prediction.tier.as_str())
    .bind(supporting_signals)
    .bind(features)
    .bind(weights)
    .bind(prediction.uncertainty)
    .bind(&prediction.drivers)
    .bind(prediction.generated_at)
    .fetch_one(&mut *tx)
    .await?;

    let approval = sqlx::query_as::<_, ApprovalRecordRow>(
        "INSERT INTO approval_records (public_id, prediction_id) \
         VALUES ($1, $2) \
         RETURNING id, public_id, prediction_id, state, operator_id, notes, \
                   decided_at, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(row.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(
        entity_id = %row.entity_id,
        prediction_id = %row.public_id,
        approval_id = %approval.public_id,
        tcs = row.tcs,
        "prediction stored pending approval"
    );

    Ok((row, approval))
}

/// Fetch a prediction by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_prediction(pool: &PgPool, id: i64) -> Result<PredictionRow, DbError> {
    sqlx::query_as::<_, PredictionRow>(
        "SELECT id, public_id, entity_id, regions, tcs, tier, supporting_signals, \
                features, weights, uncertainty, drivers, generated_at \
         FROM predictions \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
