use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use trendgate_db::{CollectionRunRow, CollectionRunSourceRow};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct RunSourceItem {
    source: String,
    status: String,
    rows_collected: i32,
    terms_attempted: i32,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunItem {
    run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    rows_written: i32,
    duplicates_skipped: i32,
    social_items_upserted: i32,
    error_message: Option<String>,
    sources: Vec<RunSourceItem>,
}

impl From<CollectionRunSourceRow> for RunSourceItem {
    fn from(row: CollectionRunSourceRow) -> Self {
        Self {
            source: row.source,
            status: row.status,
            rows_collected: row.rows_collected,
            terms_attempted: row.terms_attempted,
            note: row.note,
        }
    }
}

fn run_item(run: CollectionRunRow, sources: Vec<CollectionRunSourceRow>) -> RunItem {
    RunItem {
        run_id: run.public_id,
        trigger_source: run.trigger_source,
        status: run.status,
        started_at: run.started_at,
        completed_at: run.completed_at,
        rows_written: run.rows_written,
        duplicates_skipped: run.duplicates_skipped,
        social_items_upserted: run.social_items_upserted,
        error_message: run.error_message,
        sources: sources.into_iter().map(RunSourceItem::from).collect(),
    }
}

/// GET /api/v1/runs/latest
pub(super) async fn latest_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RunItem>>, ApiError> {
    let Some(run) = trendgate_db::get_latest_collection_run(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
    else {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            "no collection run has been recorded",
        ));
    };

    let sources = trendgate_db::list_collection_run_sources(&state.pool, run.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: run_item(run, sources),
        meta: ResponseMeta::new(req_id.0),
    }))
}
