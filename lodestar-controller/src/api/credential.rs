//! Credential API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use lodestar_core::domain::credential::CredentialSummary;
use lodestar_core::dto::credential::CreateCredential;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteCredentialParams {
    #[serde(default)]
    pub delete_repos: bool,
    #[serde(default)]
    pub unschedule: bool,
}

/// GET /api/credentials
/// List credentials without their secrets
pub async fn list_credentials(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CredentialSummary>>> {
    tracing::debug!("Listing credentials");

    Ok(Json(state.stores.credentials.list().await?))
}

/// POST /api/credentials
pub async fn create_credential(
    State(state): State<AppState>,
    Json(req): Json<CreateCredential>,
) -> ApiResult<(StatusCode, Json<CredentialSummary>)> {
    tracing::info!("Creating credential: {} ({})", req.name, req.payload.kind());

    req.validate().map_err(ApiError::BadRequest)?;
    let credential = state.stores.credentials.create(req).await?;

    Ok((StatusCode::CREATED, Json(CredentialSummary::from(&credential))))
}

/// DELETE /api/credentials/{id}
/// Delete a credential, unlinking or deleting the repositories using it
pub async fn delete_credential(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteCredentialParams>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        "Deleting credential: {} (delete_repos: {}, unschedule: {})",
        id,
        params.delete_repos,
        params.unschedule
    );

    state
        .manager
        .delete_credential(id, params.delete_repos, params.unschedule)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
