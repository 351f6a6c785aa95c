pub mod entities;
pub mod stats;
pub mod status;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::model::{EntityId, InvalidId};
use crate::store::StoreError;

// ─── Unified error type ──────────────────────────────────────────

/// Everything a handler can fail with.
///
/// Source failures never show up here: they are absorbed into gap samples
/// and empty snapshots by the background workers.
#[derive(Debug)]
pub enum ApiError {
    AlreadyExists(EntityId),
    NotFound(EntityId),
    InvalidId(String),
    InvalidParam(String),
    Internal(String),
}

impl From<InvalidId> for ApiError {
    fn from(err: InvalidId) -> Self {
        Self::InvalidId(err.0)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists { existing, .. } => Self::AlreadyExists(existing),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, id) = match self {
            Self::AlreadyExists(id) => (
                StatusCode::BAD_REQUEST,
                "item already in database".to_string(),
                Some(id),
            ),
            Self::NotFound(id) => (StatusCode::NOT_FOUND, format!("item {id} not found"), None),
            Self::InvalidId(raw) => (
                StatusCode::BAD_REQUEST,
                format!("malformed id '{raw}'"),
                None,
            ),
            Self::InvalidParam(msg) => (StatusCode::BAD_REQUEST, msg, None),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let mut body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });
        if let Some(id) = id {
            body["id"] = serde_json::Value::String(id.to_string());
        }

        (status, Json(body)).into_response()
    }
}
