//! Approval queue, operator decisions, and the approved feed.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use trendgate_core::ApprovalState;
use trendgate_db::{ApprovalRecordRow, ApprovedPredictionRow, PendingApprovalRow};
use uuid::Uuid;

use crate::middleware::{OperatorIdentity, RequestId};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

// ---------------------------------------------------------------------------
// Query and request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct PendingQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApprovedQuery {
    pub region: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TodayQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(super) struct DecisionRequest {
    pub operator_id: Option<String>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct PredictionSummary {
    prediction_id: Uuid,
    entity_id: String,
    regions: Vec<String>,
    tcs: i16,
    tier: String,
    supporting_signals: i32,
    features: serde_json::Value,
    uncertainty: f64,
    drivers: Vec<String>,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct PendingItem {
    approval_id: Uuid,
    state: String,
    created_at: DateTime<Utc>,
    prediction: PredictionSummary,
}

#[derive(Debug, Serialize)]
pub(super) struct DecisionItem {
    approval_id: Uuid,
    state: String,
    operator_id: Option<String>,
    notes: Option<String>,
    decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub(super) struct ApprovedItem {
    approval_id: Uuid,
    prediction_id: Uuid,
    entity_id: String,
    regions: Vec<String>,
    tcs: i16,
    tier: String,
    supporting_signals: i32,
    features: serde_json::Value,
    weights: serde_json::Value,
    uncertainty: f64,
    drivers: Vec<String>,
    generated_at: DateTime<Utc>,
    approved_by: Option<String>,
    notes: Option<String>,
    approved_at: Option<DateTime<Utc>>,
}

impl From<PendingApprovalRow> for PendingItem {
    fn from(row: PendingApprovalRow) -> Self {
        Self {
            approval_id: row.approval_id,
            state: row.state,
            created_at: row.created_at,
            prediction: PredictionSummary {
                prediction_id: row.prediction_id,
                entity_id: row.entity_id,
                regions: row.regions,
                tcs: row.tcs,
                tier: row.tier,
                supporting_signals: row.supporting_signals,
                features: row.features,
                uncertainty: row.uncertainty,
                drivers: row.drivers,
                generated_at: row.generated_at,
            },
        }
    }
}

impl From<ApprovalRecordRow> for DecisionItem {
    fn from(row: ApprovalRecordRow) -> Self {
        Self {
            approval_id: row.public_id,
            state: row.state,
            operator_id: row.operator_id,
            notes: row.notes,
            decided_at: row.decided_at,
        }
    }
}

impl From<ApprovedPredictionRow> for ApprovedItem {
    fn from(row: ApprovedPredictionRow) -> Self {
        Self {
            approval_id: row.approval_id,
            prediction_id: row.prediction_id,
            entity_id: row.entity_id,
            regions: row.regions,
            tcs: row.tcs,
            tier: row.tier,
            supporting_signals: row.supporting_signals,
            features: row.features,
            weights: row.weights,
            uncertainty: row.uncertainty,
            drivers: row.drivers,
            generated_at: row.generated_at,
            approved_by: row.operator_id,
            notes: row.notes,
            approved_at: row.decided_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bad_request(req_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(req_id, "bad_request", message)
}

/// The operator a decision is recorded under.
///
/// A verified bearer identity wins; a differing `operatorId` in the body is
/// refused. Without auth the body must name the operator.
fn resolve_operator(
    req_id: &str,
    identity: &OperatorIdentity,
    claimed: Option<&str>,
) -> Result<String, ApiError> {
    let claimed = claimed.map(str::trim).filter(|s| !s.is_empty());

    match (&identity.0, claimed) {
        (Some(verified), Some(claimed)) if verified != claimed => Err(ApiError::new(
            req_id,
            "forbidden",
            "operatorId does not match the authenticated operator",
        )),
        (Some(verified), _) => Ok(verified.clone()),
        (None, Some(claimed)) => Ok(claimed.to_owned()),
        (None, None) => Err(ApiError::new(
            req_id,
            "validation_error",
            "operatorId is required",
        )),
    }
}

async fn decide(
    state: AppState,
    req_id: RequestId,
    identity: &OperatorIdentity,
    approval_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
    to: ApprovalState,
) -> Result<Json<ApiResponse<DecisionItem>>, ApiError> {
    let rid = &req_id.0;

    let Path(approval_id) =
        approval_id.map_err(|_| bad_request(rid, "approval id must be a UUID"))?;
    let Json(body) = body.map_err(|e| bad_request(rid, e.body_text()))?;
    let operator_id = resolve_operator(rid, identity, body.operator_id.as_deref())?;
    let notes = body.notes.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let row = trendgate_db::transition_approval(&state.pool, approval_id, to, &operator_id, notes)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(
        approval_id = %approval_id,
        operator_id = %operator_id,
        state = %to,
        "approval decided"
    );

    Ok(Json(ApiResponse {
        data: DecisionItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/signals/pending
pub(super) async fn list_pending(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<ApiResponse<Vec<PendingItem>>>, ApiError> {
    let rows = trendgate_db::list_pending_approvals(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(PendingItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/signals/{approval_id}/approve
pub(super) async fn approve(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<OperatorIdentity>,
    approval_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DecisionItem>>, ApiError> {
    decide(
        state,
        req_id,
        &identity,
        approval_id,
        body,
        ApprovalState::Approved,
    )
    .await
}

/// POST /api/v1/signals/{approval_id}/reject
pub(super) async fn reject(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<OperatorIdentity>,
    approval_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<DecisionItem>>, ApiError> {
    decide(
        state,
        req_id,
        &identity,
        approval_id,
        body,
        ApprovalState::Rejected,
    )
    .await
}

/// GET /api/v1/signals/approved?region=&date=
pub(super) async fn list_approved(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    query: Result<Query<ApprovedQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<ApprovedItem>>>, ApiError> {
    let Query(query) = query.map_err(|e| bad_request(&req_id.0, e.body_text()))?;
    let region = query.region.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let rows = trendgate_db::list_approved_predictions(
        &state.pool,
        region,
        query.date,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(ApprovedItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/signals/today?region=
///
/// `data` is `null` when nothing was approved for the current UTC day.
pub(super) async fn today_top(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<TodayQuery>,
) -> Result<Json<ApiResponse<Option<ApprovedItem>>>, ApiError> {
    let region = query.region.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let today = Utc::now().date_naive();

    let row = trendgate_db::today_top_prediction(&state.pool, region, today)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: row.map(ApprovedItem::from),
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(operator: &str) -> OperatorIdentity {
        OperatorIdentity(Some(operator.to_string()))
    }

    #[test]
    fn verified_operator_replaces_missing_body_value() {
        let operator = resolve_operator("req", &verified("alice"), None).unwrap();
        assert_eq!(operator, "alice");
    }

    #[test]
    fn mismatching_body_operator_is_forbidden() {
        let err = resolve_operator("req", &verified("alice"), Some("bob")).unwrap_err();
        assert_eq!(err.error.code, "forbidden");
    }

    #[test]
    fn body_operator_is_used_without_auth() {
        let unauthenticated = OperatorIdentity(None);
        assert_eq!(
            resolve_operator("req", &unauthenticated, Some(" carol ")).unwrap(),
            "carol"
        );
        let err = resolve_operator("req", &unauthenticated, Some("  ")).unwrap_err();
        assert_eq!(err.error.code, "validation_error");
    }

    #[test]
    fn decision_request_uses_camel_case() {
        let body: DecisionRequest =
            serde_json::from_str(r#"{"operatorId":"alice","notes":"looks real"}"#).unwrap();
        assert_eq!(body.operator_id.as_deref(), Some("alice"));
        assert_eq!(body.notes.as_deref(), Some("looks real"));
        assert!(serde_json::from_str::<DecisionRequest>(r#"{"operator":"alice"}"#).is_err());
    }

    #[test]
    fn approved_item_renames_decision_fields() {
        let item = ApprovedItem {
            approval_id: Uuid::new_v4(),
            prediction_id: Uuid::new_v4(),
            entity_id: "matcha_latte".to_string(),
            regions: vec!["KR".to_string()],
            tcs: 76,
            tier: "high".to_string(),
            supporting_signals: 6,
            features: serde_json::json!({"velocity": 0.9}),
            weights: serde_json::json!({"velocity": 0.35}),
            uncertainty: 4.5,
            drivers: vec!["social_velocity".to_string()],
            generated_at: Utc::now(),
            approved_by: Some("alice".to_string()),
            notes: None,
            approved_at: Some(Utc::now()),
        };
        let json = serde_json::to_value(&item).expect("serialize approved item");
        assert_eq!(json["approved_by"], "alice");
        assert_eq!(json["tcs"], 76);
        assert!(json.get("operator_id").is_none());
    }
}
