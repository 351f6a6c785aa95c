use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the full Axum `Router` with all routes and middleware.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Tracking API ────────────────────────────────────────
        .route("/add", post(handlers::entities::add))
        .route("/stat", get(handlers::stats::stat))
        .route("/top5", get(handlers::stats::top5))
        // ── Operations ──────────────────────────────────────────
        .route("/health", get(handlers::status::health))
        .route("/metrics", get(handlers::status::metrics))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}
