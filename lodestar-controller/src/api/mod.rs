//! API Module
//!
//! HTTP API layer for the controller.
//! Each submodule handles endpoints for a specific domain.

pub mod credential;
pub mod error;
pub mod health;
pub mod repository;

use axum::{
    Router,
    routing::{delete, get, post},
};
use lodestar_client::ClusterGateway;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::repository::Stores;
use crate::scheduler::ReconcileTasks;
use crate::service::ReconcileManager;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ReconcileManager>,
    pub stores: Stores,
    pub cluster: Arc<dyn ClusterGateway>,
    pub tasks: ReconcileTasks,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Repository endpoints
        .route("/api/repos", get(repository::list_repositories))
        .route("/api/repos", post(repository::create_repository))
        .route(
            "/api/repos/{id}/reconcile",
            post(repository::reconcile_repository),
        )
        .route("/api/repos/{id}", delete(repository::delete_repository))
        // Credential endpoints
        .route("/api/credentials", get(credential::list_credentials))
        .route("/api/credentials", post(credential::create_credential))
        .route("/api/credentials/{id}", delete(credential::delete_credential))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
