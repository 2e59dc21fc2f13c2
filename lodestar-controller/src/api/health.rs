//! Health Check API Handler
//!
//! Reports whether the cluster API is reachable.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::api::AppState;

/// GET /health
/// Pings the cluster; 503 when it cannot be reached
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.cluster.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}
