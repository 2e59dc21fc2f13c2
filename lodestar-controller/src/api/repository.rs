//! Repository API Handlers
//!
//! HTTP endpoints for tracked repositories.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use lodestar_core::domain::repository::Repository;
use lodestar_core::dto::repository::{CreateRepository, RepositoryJob, RepositoryOverview};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRepositoryParams {
    #[serde(default)]
    pub unschedule: bool,
}

/// GET /api/repos
/// List repositories with their tracked jobs and live status
pub async fn list_repositories(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RepositoryOverview>>> {
    tracing::debug!("Listing repositories");

    let repos = state.stores.repos.list().await?;
    let mut overviews = Vec::with_capacity(repos.len());

    for repository in repos {
        let files = state.stores.files.list_by_repo(repository.id).await?;
        let mut jobs = Vec::with_capacity(files.len());

        for file in &files {
            let job = RepositoryJob::from(file);
            let Some(job_id) = file.job_id() else {
                jobs.push(job);
                continue;
            };

            jobs.push(match state.cluster.job_status(job_id).await {
                Ok(status) => job.with_status(status),
                Err(e) => {
                    tracing::warn!(
                        "Job status lookup failed for {} ({}, job {}): {}",
                        file.path,
                        repository.name,
                        job_id,
                        e
                    );
                    job.with_error(e)
                }
            });
        }

        overviews.push(RepositoryOverview { repository, jobs });
    }

    Ok(Json(overviews))
}

/// POST /api/repos
/// Start tracking a repository and reconcile it in the background
pub async fn create_repository(
    State(state): State<AppState>,
    Json(req): Json<CreateRepository>,
) -> ApiResult<(StatusCode, Json<Repository>)> {
    tracing::info!("Creating repository: {}", req.name);

    req.validate().map_err(ApiError::BadRequest)?;

    if let Some(credential_id) = req.credential_id {
        if state.stores.credentials.get(credential_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "Credential {} not found",
                credential_id
            )));
        }
    }

    let repository = state.stores.repos.create(req).await?;
    state.tasks.trigger(repository.id);

    Ok((StatusCode::CREATED, Json(repository)))
}

/// POST /api/repos/{id}/reconcile
/// Queue an on-demand reconciliation
pub async fn reconcile_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Reconcile requested for repository: {}", id);

    if state.stores.repos.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Repository {} not found", id)));
    }

    if !state.tasks.trigger(id) {
        return Err(ApiError::Unavailable("Shutting down".to_string()));
    }

    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/repos/{id}
/// Stop tracking a repository, optionally deregistering its jobs
pub async fn delete_repository(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteRepositoryParams>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        "Deleting repository: {} (unschedule: {})",
        id,
        params.unschedule
    );

    state.manager.delete_repository(id, params.unschedule).await?;

    Ok(StatusCode::NO_CONTENT)
}
