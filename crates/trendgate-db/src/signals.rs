//! Database operations for the append-only `signals_raw` table.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use trendgate_core::{AggregatedTrend, EntitySignalSummary, Observation};

use crate::DbError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// An observation with the same natural key already existed.
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordTally {
    pub inserted: u64,
    pub duplicates: u64,
}

#[derive(Debug, sqlx::FromRow)]
struct AggregateRow {
    entity_id: String,
    metric: String,
    observation_count: i64,
    avg_value: f64,
    latest_value: f64,
    latest_observed_at: DateTime<Utc>,
    source_count: i64,
    region_count: i64,
}

impl From<AggregateRow> for AggregatedTrend {
    fn from(row: AggregateRow) -> Self {
        Self {
            entity_id: row.entity_id,
            metric: row.metric,
            observation_count: row.observation_count,
            avg_value: row.avg_value,
            latest_value: row.latest_value,
            latest_observed_at: row.latest_observed_at,
            source_count: row.source_count,
            region_count: row.region_count,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ObservationRow {
    source: String,
    entity_id: String,
    region: String,
    metric: String,
    value: f64,
    observed_at: DateTime<Utc>,
    source_confidence: Decimal,
}

impl From<ObservationRow> for Observation {
    fn from(row: ObservationRow) -> Self {
        Self {
            source: row.source,
            entity_id: row.entity_id,
            region: row.region,
            metric: row.metric,
            value: row.value,
            observed_at: row.observed_at,
            source_confidence: row.source_confidence.to_f64().unwrap_or_default(),
        }
    }
}

fn confidence_to_decimal(value: f64) -> Result<Decimal, DbError> {
    Decimal::try_from(value)
        .map(|d| d.round_dp(3))
        .map_err(|e| DbError::InvalidValue {
            field: "source_confidence",
            reason: format!("{value}: {e}"),
        })
}

fn check_finite(observation: &Observation) -> Result<(), DbError> {
    if observation.value.is_finite() {
        Ok(())
    } else {
        Err(DbError::InvalidValue {
            field: "value",
            reason: format!(
                "{} for {}/{}",
                observation.value, observation.entity_id, observation.metric
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert one observation; an existing natural key is left untouched.
///
/// # Errors
///
/// Returns [`DbError::InvalidValue`] for a non-finite value or confidence,
/// or [`DbError::Sqlx`] if the insert fails.
pub async fn record_observation(
    pool: &PgPool,
    observation: &Observation,
) -> Result<RecordOutcome, DbError> {
    check_finite(observation)?;
    let confidence = confidence_to_decimal(observation.source_confidence)?;

    let result = sqlx::query(
        "INSERT INTO signals_raw \
             (source, entity_id, region, metric, value, observed_at, source_confidence) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT ON CONSTRAINT signals_raw_natural_key DO NOTHING",
    )
    .bind(&observation.source)
    .bind(&observation.entity_id)
    .bind(&observation.region)
    .bind(&observation.metric)
    .bind(observation.value)
    .bind(observation.observed_at)
    .bind(confidence)
    .execute(pool)
    .await?;

    Ok(if result.rows_affected() == 0 {
        RecordOutcome::Duplicate
    } else {
        RecordOutcome::Inserted
    })
}

/// Insert a batch of observations in one statement.
///
/// Rows whose natural key already exists (in the table or earlier in the
/// same batch) are counted as duplicates.
///
/// # Errors
///
/// Returns [`DbError::InvalidValue`] if any observation carries a
/// non-finite value, or [`DbError::Sqlx`] if the insert fails. Nothing is
/// written in either case.
pub async fn record_observations(
    pool: &PgPool,
    observations: &[Observation],
) -> Result<RecordTally, DbError> {
    if observations.is_empty() {
        return Ok(RecordTally::default());
    }

    let mut sources = Vec::with_capacity(observations.len());
    let mut entity_ids = Vec::with_capacity(observations.len());
    let mut regions = Vec::with_capacity(observations.len());
    let mut metrics = Vec::with_capacity(observations.len());
    let mut values = Vec::with_capacity(observations.len());
    let mut observed_ats = Vec::with_capacity(observations.len());
    let mut confidences = Vec::with_capacity(observations.len());

    for obs in observations {
        check_finite(obs)?;
        confidences.push(confidence_to_decimal(obs.source_confidence)?);
        sources.push(obs.source.clone());
        entity_ids.push(obs.entity_id.clone());
        regions.push(obs.region.clone());
        metrics.push(obs.metric.clone());
        values.push(obs.value);
        observed_ats.push(obs.observed_at);
    }

    let result = sqlx::query(
        "INSERT INTO signals_raw \
             (source, entity_id, region, metric, value, observed_at, source_confidence) \
         SELECT * FROM UNNEST( \
             $1::TEXT[], $2::TEXT[], $3::TEXT[], $4::TEXT[], \
             $5::DOUBLE PRECISION[], $6::TIMESTAMPTZ[], $7::NUMERIC[]) \
         ON CONFLICT ON CONSTRAINT signals_raw_natural_key DO NOTHING",
    )
    .bind(&sources)
    .bind(&entity_ids)
    .bind(&regions)
    .bind(&metrics)
    .bind(&values)
    .bind(&observed_ats)
    .bind(&confidences)
    .execute(pool)
    .await?;

    let inserted = result.rows_affected();
    let total = u64::try_from(observations.len()).unwrap_or(u64::MAX);
    Ok(RecordTally {
        inserted,
        duplicates: total.saturating_sub(inserted),
    })
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Per `(entity, metric)` aggregates over observations at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_aggregates(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<AggregatedTrend>, DbError> {
    let rows = sqlx::query_as::<_, AggregateRow>(
        "SELECT entity_id, metric, \
                COUNT(*) AS observation_count, \
                AVG(value) AS avg_value, \
                (ARRAY_AGG(value ORDER BY observed_at DESC, id DESC))[1] AS latest_value, \
                MAX(observed_at) AS latest_observed_at, \
                COUNT(DISTINCT source) AS source_count, \
                COUNT(DISTINCT region) AS region_count \
         FROM signals_raw \
         WHERE observed_at >= $1 \
         GROUP BY entity_id, metric \
         ORDER BY entity_id, metric",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AggregatedTrend::from).collect())
}

/// The latest observation of `metric` for every entity, as single-point
/// aggregates.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_per_entity(
    pool: &PgPool,
    metric: &str,
) -> Result<Vec<AggregatedTrend>, DbError> {
    let rows = sqlx::query_as::<_, AggregateRow>(
        "SELECT DISTINCT ON (entity_id) \
                entity_id, metric, \
                1::BIGINT AS observation_count, \
                value AS avg_value, \
                value AS latest_value, \
                observed_at AS latest_observed_at, \
                1::BIGINT AS source_count, \
                1::BIGINT AS region_count \
         FROM signals_raw \
         WHERE metric = $1 \
         ORDER BY entity_id, observed_at DESC, id DESC",
    )
    .bind(metric)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AggregatedTrend::from).collect())
}

/// Entities with at least one observation in `[since, until]`, in id order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scoring_candidates(
    pool: &PgPool,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<String>, DbError> {
    let ids = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT entity_id \
         FROM signals_raw \
         WHERE observed_at >= $1 AND observed_at <= $2 \
         ORDER BY entity_id",
    )
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Load everything the feature extractor needs for one entity in `[since, until]`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any query fails.
pub async fn entity_signal_summary(
    pool: &PgPool,
    entity_id: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<EntitySignalSummary, DbError> {
    let observations: Vec<Observation> = sqlx::query_as::<_, ObservationRow>(
        "SELECT source, entity_id, region, metric, value, observed_at, source_confidence \
         FROM signals_raw \
         WHERE entity_id = $1 AND observed_at >= $2 AND observed_at <= $3 \
         ORDER BY observed_at, id",
    )
    .bind(entity_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Observation::from)
    .collect();

    let aggregates: Vec<AggregatedTrend> = sqlx::query_as::<_, AggregateRow>(
        "SELECT entity_id, metric, \
                COUNT(*) AS observation_count, \
                AVG(value) AS avg_value, \
                (ARRAY_AGG(value ORDER BY observed_at DESC, id DESC))[1] AS latest_value, \
                MAX(observed_at) AS latest_observed_at, \
                COUNT(DISTINCT source) AS source_count, \
                COUNT(DISTINCT region) AS region_count \
         FROM signals_raw \
         WHERE entity_id = $1 AND observed_at >= $2 AND observed_at <= $3 \
         GROUP BY entity_id, metric \
         ORDER BY metric",
    )
    .bind(entity_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(AggregatedTrend::from)
    .collect();

    let mut sources: Vec<String> = observations.iter().map(|o| o.source.clone()).collect();
    sources.sort();
    sources.dedup();

    let mut regions: Vec<String> = observations.iter().map(|o| o.region.clone()).collect();
    regions.sort();
    regions.dedup();

    let mut pairs: Vec<(&str, &str)> = observations
        .iter()
        .map(|o| (o.source.as_str(), o.metric.as_str()))
        .collect();
    pairs.sort_unstable();
    pairs.dedup();
    let supporting_signals = u32::try_from(pairs.len()).unwrap_or(u32::MAX);

    Ok(EntitySignalSummary {
        entity_id: entity_id.to_string(),
        window_start: since,
        window_end: until,
        aggregates,
        sources,
        regions,
        supporting_signals,
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rounds_to_column_scale() {
        assert_eq!(confidence_to_decimal(0.8).unwrap(), Decimal::new(8, 1));
        assert_eq!(confidence_to_decimal(0.12345).unwrap(), Decimal::new(123, 3));
    }

    #[test]
    fn non_finite_confidence_is_rejected() {
        assert!(matches!(
            confidence_to_decimal(f64::NAN),
            Err(DbError::InvalidValue {
                field: "source_confidence",
                ..
            })
        ));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        let obs = Observation {
            source: "naver".to_string(),
            entity_id: "말차".to_string(),
            region: "KR".to_string(),
            metric: "search_index".to_string(),
            value: f64::INFINITY,
            observed_at: Utc::now(),
            source_confidence: 0.7,
        };
        assert!(matches!(
            check_finite(&obs),
            Err(DbError::InvalidValue { field: "value", .. })
        ));
    }
}
