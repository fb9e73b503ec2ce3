//! Database operations for `collection_runs` and `collection_run_sources`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use trendgate_core::{RunStatus, SourceStatus};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `collection_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rows_written: i32,
    pub duplicates_skipped: i32,
    pub social_items_upserted: i32,
    /// Failure reason, or the degraded-source notes of a successful run.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `collection_run_sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunSourceRow {
    pub id: i64,
    pub collection_run_id: i64,
    pub source: String,
    pub status: String,
    pub rows_collected: i32,
    pub terms_attempted: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Totals written by a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub rows_written: u64,
    pub duplicates_skipped: u64,
    pub social_items_upserted: u64,
}

fn to_i32(field: &'static str, value: u64) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|e| DbError::InvalidValue {
        field,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// collection_runs operations
// ---------------------------------------------------------------------------

/// Creates a new collection run in `running` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_collection_run(
    pool: &PgPool,
    trigger_source: &str,
) -> Result<CollectionRunRow, DbError> {
    let row = sqlx::query_as::<_, CollectionRunRow>(
        "INSERT INTO collection_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'running') \
         RETURNING id, public_id, trigger_source, status, started_at, completed_at, \
                   rows_written, duplicates_skipped, social_items_upserted, \
                   error_message, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Moves a `running` run to a terminal status with its counts.
async fn finish_collection_run(
    pool: &PgPool,
    id: i64,
    status: RunStatus,
    counts: RunCounts,
    message: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = $1, completed_at = NOW(), rows_written = $2, \
             duplicates_skipped = $3, social_items_upserted = $4, error_message = $5 \
         WHERE id = $6 AND status = 'running'",
    )
    .bind(status.as_str())
    .bind(to_i32("rows_written", counts.rows_written)?)
    .bind(to_i32("duplicates_skipped", counts.duplicates_skipped)?)
    .bind(to_i32("social_items_upserted", counts.social_items_upserted)?)
    .bind(message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `success`. `notes` records degraded sources, if any.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_collection_run(
    pool: &PgPool,
    id: i64,
    counts: RunCounts,
    notes: Option<&str>,
) -> Result<(), DbError> {
    finish_collection_run(pool, id, RunStatus::Success, counts, notes).await
}

/// Marks a run as `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_collection_run(
    pool: &PgPool,
    id: i64,
    counts: RunCounts,
    error_message: &str,
) -> Result<(), DbError> {
    finish_collection_run(pool, id, RunStatus::Failed, counts, Some(error_message)).await
}

/// Marks a run as `cancelled`; rows written before cancellation stay.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn cancel_collection_run(
    pool: &PgPool,
    id: i64,
    counts: RunCounts,
) -> Result<(), DbError> {
    finish_collection_run(
        pool,
        id,
        RunStatus::Cancelled,
        counts,
        Some("cancelled before all sources finished"),
    )
    .await
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_collection_run(pool: &PgPool, id: i64) -> Result<CollectionRunRow, DbError> {
    sqlx::query_as::<_, CollectionRunRow>(
        "SELECT id, public_id, trigger_source, status, started_at, completed_at, \
                rows_written, duplicates_skipped, social_items_upserted, \
                error_message, created_at \
         FROM collection_runs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// The most recently started run, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_latest_collection_run(
    pool: &PgPool,
) -> Result<Option<CollectionRunRow>, DbError> {
    let row = sqlx::query_as::<_, CollectionRunRow>(
        "SELECT id, public_id, trigger_source, status, started_at, completed_at, \
                rows_written, duplicates_skipped, social_items_upserted, \
                error_message, created_at \
         FROM collection_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// collection_run_sources operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-source result row for a collection run.
///
/// Conflicts on `(collection_run_id, source)` update the row in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_collection_run_source(
    pool: &PgPool,
    run_id: i64,
    source: &str,
    status: SourceStatus,
    rows_collected: u64,
    terms_attempted: u32,
    note: Option<&str>,
) -> Result<(), DbError> {
    let terms_attempted = to_i32("terms_attempted", u64::from(terms_attempted))?;

    sqlx::query(
        "INSERT INTO collection_run_sources \
             (collection_run_id, source, status, rows_collected, terms_attempted, note) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (collection_run_id, source) DO UPDATE SET \
             status          = EXCLUDED.status, \
             rows_collected  = EXCLUDED.rows_collected, \
             terms_attempted = EXCLUDED.terms_attempted, \
             note            = EXCLUDED.note",
    )
    .bind(run_id)
    .bind(source)
    .bind(status.as_str())
    .bind(to_i32("rows_collected", rows_collected)?)
    .bind(terms_attempted)
    .bind(note)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all per-source result rows for a run, by source name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_run_sources(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<CollectionRunSourceRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionRunSourceRow>(
        "SELECT id, collection_run_id, source, status, rows_collected, terms_attempted, \
                note, created_at \
         FROM collection_run_sources \
         WHERE collection_run_id = $1 \
         ORDER BY source",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
