//! The approval gate: `approval_records`, their append-only `approval_events`
//! audit trail, and the read-only publication queries over approved
//! predictions.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use trendgate_core::ApprovalState;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `approval_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalRecordRow {
    pub id: i64,
    pub public_id: Uuid,
    pub prediction_id: i64,
    pub state: String,
    pub operator_id: Option<String>,
    pub notes: Option<String>,
    /// `NULL` exactly while the record is `pending`.
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `approval_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovalEventRow {
    pub id: i64,
    pub approval_record_id: i64,
    pub from_state: String,
    pub to_state: String,
    pub operator_id: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A pending approval joined with the prediction it gates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingApprovalRow {
    pub approval_id: Uuid,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub prediction_id: Uuid,
    pub entity_id: String,
    pub regions: Vec<String>,
    pub tcs: i16,
    pub tier: String,
    pub supporting_signals: i32,
    pub features: serde_json::Value,
    pub uncertainty: f64,
    pub drivers: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// An approved prediction with the decision that released it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApprovedPredictionRow {
    pub approval_id: Uuid,
    pub prediction_id: Uuid,
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
    pub operator_id: Option<String>,
    pub notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Move a `pending` record to `to`, appending the audit event in the same
/// transaction.
///
/// The update is guarded by `state = 'pending'`, so of two racing
/// decisions exactly one succeeds.
///
/// # Errors
///
/// - [`DbError::AlreadyProcessed`] if the record already left `pending`
///   (its state is untouched).
/// - [`DbError::UnknownEntity`] if no record has this id.
/// - [`DbError::InvalidValue`] if `to` is `pending` or `operator_id` is blank.
/// - [`DbError::Sqlx`] on query failure.
pub async fn transition_approval(
    pool: &PgPool,
    approval_id: Uuid,
    to: ApprovalState,
    operator_id: &str,
    notes: Option<&str>,
) -> Result<ApprovalRecordRow, DbError> {
    if !to.is_terminal() {
        return Err(DbError::InvalidValue {
            field: "state",
            reason: format!("cannot transition to '{to}'"),
        });
    }
    let operator_id = operator_id.trim();
    if operator_id.is_empty() {
        return Err(DbError::InvalidValue {
            field: "operator_id",
            reason: "operator id must not be blank".to_string(),
        });
    }

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, ApprovalRecordRow>(
        "UPDATE approval_records \
         SET state = $1, operator_id = $2, notes = $3, decided_at = NOW() \
         WHERE public_id = $4 AND state = 'pending' \
         RETURNING id, public_id, prediction_id, state, operator_id, notes, \
                   decided_at, created_at",
    )
    .bind(to.as_str())
    .bind(operator_id)
    .bind(notes)
    .bind(approval_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(record) = updated else {
        tx.rollback().await?;
        return Err(rejected_transition(pool, approval_id).await);
    };

    sqlx::query(
        "INSERT INTO approval_events \
             (approval_record_id, from_state, to_state, operator_id, notes) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(record.id)
    .bind(ApprovalState::Pending.as_str())
    .bind(to.as_str())
    .bind(operator_id)
    .bind(notes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        approval_id = %approval_id,
        operator_id,
        to_state = %to,
        "approval record decided"
    );

    Ok(record)
}

/// Classify a guarded update that matched no row.
async fn rejected_transition(pool: &PgPool, approval_id: Uuid) -> DbError {
    let current = sqlx::query_scalar::<_, String>(
        "SELECT state FROM approval_records WHERE public_id = $1",
    )
    .bind(approval_id)
    .fetch_optional(pool)
    .await;

    match current {
        Ok(Some(state)) => match state.parse::<ApprovalState>() {
            Ok(current_state) => DbError::AlreadyProcessed { current_state },
            Err(e) => DbError::InvalidState(e),
        },
        Ok(None) => DbError::UnknownEntity(approval_id),
        Err(e) => DbError::Sqlx(e),
    }
}

/// Approve a pending record. See [`transition_approval`].
///
/// # Errors
///
/// Same as [`transition_approval`].
pub async fn approve_record(
    pool: &PgPool,
    approval_id: Uuid,
    operator_id: &str,
    notes: Option<&str>,
) -> Result<ApprovalRecordRow, DbError> {
    transition_approval(pool, approval_id, ApprovalState::Approved, operator_id, notes).await
}

/// Reject a pending record. See [`transition_approval`].
///
/// # Errors
///
/// Same as [`transition_approval`].
pub async fn reject_record(
    pool: &PgPool,
    approval_id: Uuid,
    operator_id: &str,
    notes: Option<&str>,
) -> Result<ApprovalRecordRow, DbError> {
    transition_approval(pool, approval_id, ApprovalState::Rejected, operator_id, notes).await
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::NotFound`] if no record has this id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_approval_record(
    pool: &PgPool,
    approval_id: Uuid,
) -> Result<ApprovalRecordRow, DbError> {
    sqlx::query_as::<_, ApprovalRecordRow>(
        "SELECT id, public_id, prediction_id, state, operator_id, notes, decided_at, created_at \
         FROM approval_records \
         WHERE public_id = $1",
    )
    .bind(approval_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Audit events for one record, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_approval_events(
    pool: &PgPool,
    approval_id: Uuid,
) -> Result<Vec<ApprovalEventRow>, DbError> {
    let rows = sqlx::query_as::<_, ApprovalEventRow>(
        "SELECT e.id, e.approval_record_id, e.from_state, e.to_state, e.operator_id, \
                e.notes, e.created_at \
         FROM approval_events e \
         JOIN approval_records ar ON ar.id = e.approval_record_id \
         WHERE ar.public_id = $1 \
         ORDER BY e.created_at, e.id",
    )
    .bind(approval_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Pending records with their predictions, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_approvals(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<PendingApprovalRow>, DbError> {
    let rows = sqlx::query_as::<_, PendingApprovalRow>(
        "SELECT ar.public_id AS approval_id, ar.state, ar.created_at, \
                p.public_id AS prediction_id, p.entity_id, p.regions, p.tcs, p.tier, \
                p.supporting_signals, p.features, p.uncertainty, p.drivers, p.generated_at \
         FROM approval_records ar \
         JOIN predictions p ON p.id = ar.prediction_id \
         WHERE ar.state = 'pending' \
         ORDER BY ar.created_at, ar.id \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Approved predictions, newest first.
///
/// `region` matches any entry of the prediction's regions; `date` matches
/// the UTC calendar day the prediction was generated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_approved_predictions(
    pool: &PgPool,
    region: Option<&str>,
    date: Option<NaiveDate>,
    limit: i64,
) -> Result<Vec<ApprovedPredictionRow>, DbError> {
    let rows = sqlx::query_as::<_, ApprovedPredictionRow>(
        "SELECT ar.public_id AS approval_id, p.public_id AS prediction_id, p.entity_id, \
                p.regions, p.tcs, p.tier, p.supporting_signals, p.features, p.weights, \
                p.uncertainty, p.drivers, p.generated_at, \
                ar.operator_id, ar.notes, ar.decided_at \
         FROM approval_records ar \
         JOIN predictions p ON p.id = ar.prediction_id \
         WHERE ar.state = 'approved' \
           AND ($1::TEXT IS NULL OR $1 = ANY(p.regions)) \
           AND ($2::DATE IS NULL OR (p.generated_at AT TIME ZONE 'UTC')::DATE = $2) \
         ORDER BY p.generated_at DESC, p.id DESC \
         LIMIT $3",
    )
    .bind(region)
    .bind(date)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The highest-TCS approved prediction generated on `day` (UTC), if any.
///
/// Ties go to the most recently generated prediction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn today_top_prediction(
    pool: &PgPool,
    region: Option<&str>,
    day: NaiveDate,
) -> Result<Option<ApprovedPredictionRow>, DbError> {
    let row = sqlx::query_as::<_, ApprovedPredictionRow>(
        "SELECT ar.public_id AS approval_id, p.public_id AS prediction_id, p.entity_id, \
                p.regions, p.tcs, p.tier, p.supporting_signals, p.features, p.weights, \
                p.uncertainty, p.drivers, p.generated_at, \
                ar.operator_id, ar.notes, ar.decided_at \
         FROM approval_records ar \
         JOIN predictions p ON p.id = ar.prediction_id \
         WHERE ar.state = 'approved' \
           AND ($1::TEXT IS NULL OR $1 = ANY(p.regions)) \
           AND (p.generated_at AT TIME ZONE 'UTC')::DATE = $2 \
         ORDER BY p.tcs DESC, p.generated_at DESC, p.id DESC \
         LIMIT 1",
    )
    .bind(region)
    .bind(day)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
