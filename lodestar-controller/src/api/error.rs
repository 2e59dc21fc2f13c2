//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::ReconcileError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    /// The cluster rejected or failed a request made on the caller's behalf
    ClusterError(String),
    Unavailable(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ClusterError(msg) => {
                tracing::warn!("Cluster error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::StoreError(err) => {
                tracing::error!("Store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::StoreError(other),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::RepositoryNotFound(id) => {
                ApiError::NotFound(format!("Repository {} not found", id))
            }
            ReconcileError::CredentialNotFound(id) => {
                ApiError::NotFound(format!("Credential {} not found", id))
            }
            ReconcileError::LinkedCredentialMissing(_) => ApiError::BadRequest(err.to_string()),
            ReconcileError::Store(err) => err.into(),
            ReconcileError::Cluster(err) if err.is_retryable() => {
                ApiError::Unavailable(err.to_string())
            }
            ReconcileError::Cluster(err) => ApiError::ClusterError(err.to_string()),
            ReconcileError::Sync(err) => ApiError::InternalError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
