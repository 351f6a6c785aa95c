use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::model::{is_valid_region, EntityId};
use crate::AppState;

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddParams {
    /// Lowercase latin region slug, e.g. `moskva`
    pub region: String,
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub id: EntityId,
}

// ─── POST /add?region=..&query=.. ────────────────────────────────

/// Registers the pair and queues its top-items snapshot. The response does
/// not wait for the snapshot.
pub async fn add(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddParams>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    tracing::info!(region = %params.region, query = %params.query, "/add");

    if !is_valid_region(&params.region) {
        return Err(ApiError::InvalidParam(format!(
            "region '{}' must be lowercase latin letters",
            params.region
        )));
    }

    let (id, _ticket) = state.register(&params.region, &params.query).await?;

    Ok((StatusCode::CREATED, Json(Created { id })))
}
