// POST handlers: agent batches, call observations, and records forwarded by peer nodes.

use axum::{Json, extract::State, response::IntoResponse};
use bytes::Bytes;

use super::{ApiError, AppState};
use crate::aggregation::ingest::{indicators_from_batch, indicators_from_observations};
use crate::indicator::IndicatorRecord;
use crate::models::{MetricBatch, RemoteMessage, ServiceCallObservation};

async fn route(
    state: &AppState,
    records: Vec<IndicatorRecord>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let accepted = state
        .router
        .route_all(records)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(serde_json::json!({ "accepted": accepted })))
}

/// POST /v1/metrics: JSON `MetricBatch` from an agent.
pub(super) async fn metrics_handler(
    State(state): State<AppState>,
    Json(batch): Json<MetricBatch>,
) -> Result<impl IntoResponse, ApiError> {
    route(&state, indicators_from_batch(&batch)).await
}

/// POST /v1/service-relations: JSON list of observed calls.
pub(super) async fn service_relations_handler(
    State(state): State<AppState>,
    Json(observations): Json<Vec<ServiceCallObservation>>,
) -> Result<impl IntoResponse, ApiError> {
    route(&state, indicators_from_observations(&observations)).await
}

/// POST /v1/remote: wincode `RemoteMessage`; routed by distribution key like local records.
pub(super) async fn remote_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let message =
        RemoteMessage::decode(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let record =
        IndicatorRecord::from_remote(&message).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    route(&state, vec![record]).await
}
