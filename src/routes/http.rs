// GET handlers: version, persisted indicators

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiError, AppState};
use crate::indicator::{Downsampling, IndicatorKind};
use crate::version::{NAME, VERSION};

const DEFAULT_LIMIT: u32 = 60;
const MAX_LIMIT: u32 = 1000;

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct IndicatorQuery {
    limit: Option<u32>,
}

/// GET /api/indicators/{kind}/{granularity}?limit=N: most recent rows, oldest first.
pub(super) async fn indicators_handler(
    State(state): State<AppState>,
    Path((kind, granularity)): Path<(String, String)>,
    Query(query): Query<IndicatorQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = IndicatorKind::from_index_name(&kind)
        .ok_or_else(|| ApiError::NotFound(format!("unknown indicator kind {kind}")))?;
    let downsampling = Downsampling::parse(&granularity)
        .ok_or_else(|| ApiError::NotFound(format!("unknown granularity {granularity}")))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let rows = state.repo.recent_rows(kind, downsampling, limit).await?;
    Ok(axum::Json(rows))
}
