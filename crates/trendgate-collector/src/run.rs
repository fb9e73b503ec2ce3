//! Persisted collection run: collect, write, and record the summary row.

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::watch;
use trendgate_core::RunStatus;
use trendgate_db::RunCounts;
use uuid::Uuid;

use crate::orchestrator::{collect_batch, decide_run_status, AdapterJob, SourceReport};
use crate::CollectorError;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub public_id: Uuid,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub reports: Vec<SourceReport>,
    pub message: Option<String>,
}

/// Execute one collection run end to end.
///
/// Sources in `skipped` (never constructed) are recorded alongside the
/// queried ones. Once the run row exists it always ends in a terminal
/// status: if writing the batch, a source row, or the final status fails,
/// the run is marked `failed` and the error returned.
///
/// # Errors
///
/// Returns [`CollectorError::Db`] if the run cannot be created, the batch
/// cannot be written, or the run summary cannot be recorded.
pub async fn run_collection(
    pool: &PgPool,
    jobs: &[AdapterJob],
    skipped: Vec<SourceReport>,
    trigger_source: &str,
    cancel: &watch::Receiver<bool>,
) -> Result<RunSummary, CollectorError> {
    let run = trendgate_db::create_collection_run(pool, trigger_source).await?;
    tracing::info!(
        run_id = %run.public_id,
        sources = jobs.len(),
        skipped = skipped.len(),
        "collection run started"
    );

    let outcome = collect_batch(jobs, Utc::now(), cancel).await;
    let mut reports = outcome.reports;
    reports.extend(skipped);

    let counts = match persist(pool, &outcome.batch).await {
        Ok(counts) => counts,
        Err(e) => {
            if let Err(source_err) = record_sources(pool, run.id, &reports).await {
                tracing::warn!(
                    run_id = %run.public_id,
                    error = %source_err,
                    "could not record source rows for failed run"
                );
            }
            fail_run_best_effort(
                pool,
                run.id,
                RunCounts::default(),
                &format!("failed to persist batch: {e}"),
            )
            .await;
            return Err(e);
        }
    };

    if let Err(e) = record_sources(pool, run.id, &reports).await {
        fail_run_best_effort(
            pool,
            run.id,
            counts,
            &format!("failed to record source rows: {e}"),
        )
        .await;
        return Err(e);
    }

    let (status, message) = decide_run_status(&reports, outcome.cancelled);
    if let Err(e) = finish_run(pool, run.id, status, counts, message.as_deref()).await {
        fail_run_best_effort(
            pool,
            run.id,
            counts,
            &format!("failed to record run status {status}: {e}"),
        )
        .await;
        return Err(e);
    }

    tracing::info!(
        run_id = %run.public_id,
        status = %status,
        rows_written = counts.rows_written,
        duplicates_skipped = counts.duplicates_skipped,
        social_items_upserted = counts.social_items_upserted,
        "collection run finished"
    );

    Ok(RunSummary {
        run_id: run.id,
        public_id: run.public_id,
        status,
        counts,
        reports,
        message,
    })
}

async fn record_sources(
    pool: &PgPool,
    run_id: i64,
    reports: &[SourceReport],
) -> Result<(), CollectorError> {
    for report in reports {
        trendgate_db::upsert_collection_run_source(
            pool,
            run_id,
            &report.source,
            report.status,
            report.observations,
            report.terms_attempted,
            report.note.as_deref(),
        )
        .await?;
    }
    Ok(())
}

async fn finish_run(
    pool: &PgPool,
    run_id: i64,
    status: RunStatus,
    counts: RunCounts,
    message: Option<&str>,
) -> Result<(), CollectorError> {
    match status {
        RunStatus::Success => {
            trendgate_db::complete_collection_run(pool, run_id, counts, message).await?;
        }
        RunStatus::Cancelled => {
            trendgate_db::cancel_collection_run(pool, run_id, counts).await?;
        }
        RunStatus::Failed | RunStatus::Running => {
            let message = message.unwrap_or("run failed");
            trendgate_db::fail_collection_run(pool, run_id, counts, message).await?;
        }
    }
    Ok(())
}

async fn persist(
    pool: &PgPool,
    batch: &trendgate_sources::SourceBatch,
) -> Result<RunCounts, CollectorError> {
    let tally = trendgate_db::record_observations(pool, &batch.observations).await?;

    let mut social_items_upserted: u64 = 0;
    for item in &batch.content {
        trendgate_db::upsert_social_content(pool, item).await?;
        social_items_upserted += 1;
    }

    Ok(RunCounts {
        rows_written: tally.inserted,
        duplicates_skipped: tally.duplicates,
        social_items_upserted,
    })
}

async fn fail_run_best_effort(pool: &PgPool, run_id: i64, counts: RunCounts, message: &str) {
    if let Err(mark_err) = trendgate_db::fail_collection_run(pool, run_id, counts, message).await
    {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark collection run as failed"
        );
    }
}
