//! On-demand reconciliation tasks
//!
//! Each pass runs on a [`TaskTracker`] so shutdown can wait for outstanding
//! work instead of abandoning detached tasks.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::service::ReconcileManager;

/// Spawns tracked single-repository reconciliations
#[derive(Clone)]
pub struct ReconcileTasks {
    manager: Arc<ReconcileManager>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl ReconcileTasks {
    pub fn new(manager: Arc<ReconcileManager>, shutdown: CancellationToken) -> Self {
        Self {
            manager,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Queues a reconciliation of one repository
    ///
    /// Returns `false` once shutdown has begun.
    pub fn trigger(&self, repo_id: Uuid) -> bool {
        if self.tracker.is_closed() || self.shutdown.is_cancelled() {
            warn!("Shutting down, not reconciling repository {}", repo_id);
            return false;
        }

        let manager = Arc::clone(&self.manager);
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Reconciliation of repository {} abandoned on shutdown", repo_id);
                }
                result = manager.reconcile_repo(repo_id) => {
                    if let Err(e) = result {
                        error!("Reconciliation of repository {} failed: {:#}", repo_id, e);
                    }
                }
            }
        });

        true
    }

    /// Number of passes still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting work and waits up to `timeout` for running passes
    ///
    /// Returns `false` when the timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();

        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                "{} reconciliation task(s) still running after {:?}",
                self.tracker.len(),
                timeout
            );
            return false;
        }

        true
    }
}
