//! Reconcile poller
//!
//! Runs a full reconciliation cycle on every tick until the shutdown token is
//! cancelled.

use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::ReconcileManager;

/// Timer-driven loop over [`ReconcileManager::run_once`]
pub struct ReconcilePoller {
    manager: Arc<ReconcileManager>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ReconcilePoller {
    pub fn new(
        manager: Arc<ReconcileManager>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            manager,
            interval,
            shutdown,
        }
    }

    /// Starts the polling loop, returning once shutdown is requested
    pub async fn run(&self) {
        info!("Starting reconcile poller (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        // A slow cycle should not be followed by a burst of catch-up cycles
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            debug!("Starting reconciliation cycle");

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested during reconciliation cycle");
                    break;
                }
                result = self.manager.run_once() => {
                    if let Err(e) = result {
                        error!("Error during reconciliation cycle: {:#}", e);
                    }
                }
            }
        }

        info!("Reconcile poller stopped");
    }
}
