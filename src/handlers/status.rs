use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::metrics::MetricsSnapshot;
use crate::AppState;

// ─── GET /health ─────────────────────────────────────────────────

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// ─── GET /metrics ────────────────────────────────────────────────

/// Ingestion and snapshot counters plus latency percentiles.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
