use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::model::{EntityId, Sample};
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct StatParams {
    pub id: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Deserialize)]
pub struct TopParams {
    pub id: String,
}

// ─── GET /stat?id=..&start=..&end=.. ─────────────────────────────

/// Samples with `start <= timestamp <= end`. Failed samples carry
/// `"count": null`.
pub async fn stat(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatParams>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let id: EntityId = params.id.parse()?;
    tracing::debug!(entity_id = %id, start = params.start, end = params.end, "/stat");

    let samples = state.queries.range_query(id, params.start, params.end).await?;
    Ok(Json(samples))
}

// ─── GET /top5?id=.. ─────────────────────────────────────────────

/// Up to five absolute item URLs, in the source's order. Empty until the
/// registration snapshot has completed, or forever if it failed.
pub async fn top5(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let id: EntityId = params.id.parse()?;
    tracing::debug!(entity_id = %id, "/top5");

    Ok(Json(state.queries.top_items(id).await?))
}
