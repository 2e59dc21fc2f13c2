//! Lodestar Controller
//!
//! A GitOps controller that keeps Nomad jobs in line with the job files
//! committed to git repositories.
//!
//! Architecture:
//! - Configuration: Load settings from `LODESTAR_*` environment variables
//! - Repositories: SQLite stores for repositories, tracked files and encrypted credentials
//! - Sync: Git working copies and job file discovery
//! - Services: Reconciliation of repositories against the cluster
//! - Scheduler: Timer-driven cycles and tracked on-demand passes
//! - API: HTTP endpoints for operators
//!
//! Every poll interval each repository is synced, changed or drifted jobs are
//! registered, and jobs whose file was removed are deregistered.

mod api;
mod config;
mod crypto;
mod db;
mod repository;
mod scheduler;
mod service;
mod sync;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::crypto::Encryptor;
use crate::repository::Stores;
use crate::scheduler::{ReconcilePoller, ReconcileTasks};
use crate::service::ReconcileManager;
use crate::sync::GitSync;
use lodestar_client::NomadClient;

/// How long shutdown waits for on-demand reconciliations
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lodestar_controller=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Lodestar Controller");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: nomad_addr={}, repo_base_dir={}, poll_interval={:?}, plan_before_apply={}",
        config.nomad_addr,
        config.repo_base_dir.display(),
        config.poll_interval,
        config.plan_before_apply
    );

    // Database
    if let Some(dir) = db::database_dir(&config.database_url) {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let encryptor =
        Encryptor::from_hex(&config.credential_key).context("Invalid credential key")?;
    let stores = Stores::sqlite(pool.clone(), encryptor);

    // Git working copies
    tokio::fs::create_dir_all(&config.repo_base_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create repository directory {}",
                config.repo_base_dir.display()
            )
        })?;
    let git = GitSync::new(config.repo_base_dir.clone());

    // Cluster client
    let nomad = Arc::new(nomad_client(&config));
    match nomad.ping().await {
        Ok(()) => info!("Connected to Nomad at {}", config.nomad_addr),
        Err(e) => warn!("Nomad not reachable at {}: {}", config.nomad_addr, e),
    }

    let shutdown = CancellationToken::new();

    let manager = Arc::new(
        ReconcileManager::new(stores.clone(), git, nomad.clone(), nomad.clone())
            .with_plan_before_apply(config.plan_before_apply)
            .with_shutdown(shutdown.clone()),
    );

    info!("Services initialized");

    // Background reconciliation
    let tasks = ReconcileTasks::new(Arc::clone(&manager), shutdown.clone());
    let poller = ReconcilePoller::new(
        Arc::clone(&manager),
        config.poll_interval,
        shutdown.clone(),
    );
    let poller_handle = tokio::spawn(async move { poller.run().await });

    // HTTP
    let app = api::create_router(AppState {
        manager,
        stores,
        cluster: nomad,
        tasks: tasks.clone(),
    });

    info!("Listening on {}", config.http_addr);

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("HTTP server failed")?;

    info!("Lodestar Controller shutting down");
    shutdown.cancel();

    if let Err(e) = poller_handle.await {
        warn!("Poller task ended abnormally: {}", e);
    }
    if tasks.pending() > 0 {
        info!("Waiting for {} reconciliation task(s)", tasks.pending());
    }
    tasks.shutdown(SHUTDOWN_GRACE).await;
    pool.close().await;

    info!("Lodestar Controller stopped");
    Ok(())
}

/// Loads configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn nomad_client(config: &Config) -> NomadClient {
    let mut client = NomadClient::new(config.nomad_addr.clone());
    if let Some(token) = &config.nomad_token {
        client = client.with_token(token);
    }
    if let Some(namespace) = &config.nomad_namespace {
        client = client.with_namespace(namespace);
    }
    if let Some(region) = &config.nomad_region {
        client = client.with_region(region);
    }
    client
}

/// Resolves on Ctrl+C or SIGTERM, then cancels `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}
