// HTTP routes of the collector

mod http;
mod ingest;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregation::worker::WorkerRouter;
use crate::storage_repo::IndicatorRepo;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) router: WorkerRouter,
    pub(crate) repo: Arc<IndicatorRepo>,
}

pub fn app(router: WorkerRouter, repo: Arc<IndicatorRepo>) -> Router {
    let state = AppState { router, repo };
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/v1/metrics", post(ingest::metrics_handler)) // POST /v1/metrics
        .route(
            "/v1/service-relations",
            post(ingest::service_relations_handler),
        ) // POST /v1/service-relations
        .route("/v1/remote", post(ingest::remote_handler)) // POST /v1/remote
        .route(
            "/api/indicators/{kind}/{granularity}",
            get(http::indicators_handler),
        ) // GET /api/indicators/{kind}/{granularity}
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

/// Handler error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(e) => {
                tracing::warn!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
