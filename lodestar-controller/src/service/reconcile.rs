//! Reconciliation Manager
//!
//! Drives repositories towards the state described by their job files: sync
//! the working copy, register what changed or drifted, deregister what was
//! removed and record the outcome.

use lodestar_client::{ClientError, ClusterGateway, JobParser};
use lodestar_core::domain::credential::CredentialPayload;
use lodestar_core::domain::job::{JobDocument, Provenance};
use lodestar_core::domain::repository::Repository;
use lodestar_core::domain::snapshot::{JobFile, Snapshot};
use lodestar_core::domain::tracked_file::TrackedFile;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::{StoreError, Stores};
use crate::sync::{GitSync, SyncError};

/// Service error type
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("repository {0} not found")]
    RepositoryNotFound(Uuid),

    #[error("credential {0} not found")]
    CredentialNotFound(Uuid),

    #[error("linked credential {0} not found")]
    LinkedCredentialMissing(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Cluster(#[from] ClientError),
}

/// Reconciles tracked repositories against the cluster
pub struct ReconcileManager {
    stores: Stores,
    git: GitSync,
    cluster: Arc<dyn ClusterGateway>,
    parser: Arc<dyn JobParser>,
    plan_before_apply: bool,
    shutdown: CancellationToken,
    locks: StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ReconcileManager {
    pub fn new(
        stores: Stores,
        git: GitSync,
        cluster: Arc<dyn ClusterGateway>,
        parser: Arc<dyn JobParser>,
    ) -> Self {
        Self {
            stores,
            git,
            cluster,
            parser,
            plan_before_apply: false,
            shutdown: CancellationToken::new(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Dry-run changed jobs and skip registrations that would change nothing
    pub fn with_plan_before_apply(mut self, enabled: bool) -> Self {
        self.plan_before_apply = enabled;
        self
    }

    /// Stops full cycles between repositories once cancelled
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    // =============================================================================
    // Reconciliation
    // =============================================================================

    /// Runs one cycle over every repository
    ///
    /// A failing repository is logged and does not stop the others.
    pub async fn run_once(&self) -> Result<(), ReconcileError> {
        let repos = self.stores.repos.list().await?;
        debug!("Reconciling {} repositories", repos.len());

        for repo in repos {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, ending reconciliation cycle early");
                break;
            }

            match self.reconcile_locked(repo.id).await {
                Ok(()) | Err(ReconcileError::RepositoryNotFound(_)) => {}
                Err(e) => error!("Repository {} reconciliation failed: {}", repo.name, e),
            }
        }

        Ok(())
    }

    /// Reconciles a single repository on demand
    pub async fn reconcile_repo(&self, id: Uuid) -> Result<(), ReconcileError> {
        self.reconcile_locked(id).await
    }

    /// Takes the repository's lock, then reloads it so the commit comparison
    /// sees whatever a previous pass recorded
    async fn reconcile_locked(&self, id: Uuid) -> Result<(), ReconcileError> {
        let lock = self.repo_lock(id);
        let _guard = lock.lock().await;

        let repo = self
            .stores
            .repos
            .get(id)
            .await?
            .ok_or(ReconcileError::RepositoryNotFound(id))?;

        self.reconcile(&repo).await
    }

    async fn reconcile(&self, repo: &Repository) -> Result<(), ReconcileError> {
        let payload = self.resolve_credential(repo).await?;

        let snapshot = match self.git.sync(repo, payload.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // The attempt is still recorded
                if let Err(poll_err) = self.stores.repos.update_poll_timestamp(repo.id).await {
                    warn!("Failed to record poll for {}: {}", repo.name, poll_err);
                }
                return Err(e.into());
            }
        };

        let commit_changed = repo.commit_changed(&snapshot.commit_hash);
        self.ensure_jobs(repo, &snapshot, commit_changed).await?;

        if commit_changed {
            self.stores
                .repos
                .update_commit_metadata(
                    repo.id,
                    &snapshot.commit_hash,
                    &snapshot.commit_author,
                    &snapshot.commit_title,
                )
                .await?;
            info!("Repository {} reconciled at {}", repo.name, snapshot.commit_hash);
        } else {
            self.stores.repos.update_poll_timestamp(repo.id).await?;
            info!("Repository {} state enforced at {}", repo.name, snapshot.commit_hash);
        }

        Ok(())
    }

    async fn resolve_credential(
        &self,
        repo: &Repository,
    ) -> Result<Option<CredentialPayload>, ReconcileError> {
        let Some(credential_id) = repo.credential_id else {
            return Ok(None);
        };

        let credential = self
            .stores
            .credentials
            .get(credential_id)
            .await?
            .ok_or(ReconcileError::LinkedCredentialMissing(credential_id))?;

        Ok(Some(self.stores.credentials.decrypt_payload(&credential)?))
    }

    /// Applies every job file that needs it and removes jobs whose file is gone
    ///
    /// Per-file failures are logged and skipped; only store failures abort.
    async fn ensure_jobs(
        &self,
        repo: &Repository,
        snapshot: &Snapshot,
        commit_changed: bool,
    ) -> Result<(), ReconcileError> {
        let tracked: BTreeMap<String, TrackedFile> = self
            .stores
            .files
            .list_by_repo(repo.id)
            .await?
            .into_iter()
            .map(|file| (file.path.clone(), file))
            .collect();

        let mut seen = HashSet::with_capacity(snapshot.job_files.len());

        for job_file in &snapshot.job_files {
            seen.insert(job_file.path.as_str());
            let tracked_job = tracked.get(&job_file.path).and_then(TrackedFile::job_id);

            let needs_apply = match tracked_job {
                _ if commit_changed => true,
                None => true,
                Some(job_id) => match self.cluster.job_status(job_id).await {
                    Ok(status) => !status.exists,
                    Err(e) => {
                        warn!(
                            "Job status check failed for {} ({}, job {}): {}",
                            job_file.path, repo.name, job_id, e
                        );
                        continue;
                    }
                },
            };

            if !needs_apply {
                continue;
            }

            let plan_against = tracked_job.filter(|_| self.plan_before_apply && commit_changed);

            match self.apply_job(repo, job_file, snapshot, plan_against).await {
                Ok(job_id) => {
                    self.stores
                        .files
                        .upsert(repo.id, &job_file.path, &snapshot.commit_hash, Some(&job_id))
                        .await?;
                }
                Err(e) => error!("Job apply failed for {} ({}): {}", job_file.path, repo.name, e),
            }
        }

        for (path, file) in &tracked {
            if seen.contains(path.as_str()) {
                continue;
            }

            if let Some(job_id) = file.job_id() {
                if let Err(e) = self.cluster.deregister_job(job_id, true).await {
                    error!(
                        "Job deregister failed for {} ({}, job {}): {}",
                        path, repo.name, job_id, e
                    );
                    continue;
                }
            }

            self.stores.files.delete(repo.id, path).await?;
            info!(
                "Job removed for {} ({}, job {})",
                path,
                repo.name,
                file.job_id().unwrap_or("-")
            );
        }

        Ok(())
    }

    /// Parses a job file, stamps provenance and registers it
    ///
    /// With `plan_against` set, a job whose dry-run shows no meaningful change
    /// is left as is.
    async fn apply_job(
        &self,
        repo: &Repository,
        job_file: &JobFile,
        snapshot: &Snapshot,
        plan_against: Option<&str>,
    ) -> Result<String, ReconcileError> {
        let (mut document, submission) = self.parser.parse(&job_file.path, &job_file.content).await?;

        document.inject_provenance(&Provenance {
            repo_url: &repo.repo_url,
            repo_name: &repo.name,
            job_file: &job_file.path,
            commit: &snapshot.commit_hash,
            commit_author: &snapshot.commit_author,
            commit_title: &snapshot.commit_title,
        });

        if let Some(live_id) = plan_against {
            if self.unchanged_in_cluster(live_id, &document).await {
                debug!(
                    "Job {} from {} unchanged by commit {}, not re-registering",
                    live_id, job_file.path, snapshot.commit_hash
                );
                return Ok(document.job_id().unwrap_or(live_id).to_string());
            }
        }

        let job_id = self.cluster.register_job(&document, &submission).await?;
        info!("Registered job {} from {} ({})", job_id, job_file.path, repo.name);
        Ok(job_id)
    }

    /// Whether the live job exists and a dry-run shows only provenance edits
    async fn unchanged_in_cluster(&self, live_id: &str, document: &JobDocument) -> bool {
        match self.cluster.job_status(live_id).await {
            Ok(status) if status.exists => {}
            Ok(_) => return false,
            Err(e) => {
                debug!("Status check before plan failed for job {}: {}", live_id, e);
                return false;
            }
        }

        match self.cluster.plan_job(document).await {
            Ok(diff) => !diff.is_meaningful(),
            Err(e) => {
                warn!("Plan failed for job {}, registering instead: {}", live_id, e);
                false
            }
        }
    }

    // =============================================================================
    // Deletion
    // =============================================================================

    /// Deletes a repository, its tracking records and its working copy
    ///
    /// With `unschedule`, every tracked job is deregistered first; the first
    /// failure aborts the deletion.
    pub async fn delete_repository(&self, id: Uuid, unschedule: bool) -> Result<(), ReconcileError> {
        let lock = self.repo_lock(id);
        let guard = lock.lock().await;

        let repo = self
            .stores
            .repos
            .get(id)
            .await?
            .ok_or(ReconcileError::RepositoryNotFound(id))?;

        if unschedule {
            for file in self.stores.files.list_by_repo(repo.id).await? {
                if let Some(job_id) = file.job_id() {
                    self.cluster.deregister_job(job_id, true).await?;
                    info!("Deregistered job {} ({})", job_id, repo.name);
                }
            }
        }

        self.stores.files.delete_by_repo(repo.id).await?;
        self.stores.repos.delete(repo.id).await?;
        self.git.remove_repo(repo.id).await?;

        drop(guard);
        self.forget_lock(id);

        info!("Repository {} deleted", repo.name);
        Ok(())
    }

    /// Deletes a credential, either deleting or unlinking dependent repositories
    pub async fn delete_credential(
        &self,
        id: Uuid,
        delete_repos: bool,
        unschedule: bool,
    ) -> Result<(), ReconcileError> {
        let credential = self
            .stores
            .credentials
            .get(id)
            .await?
            .ok_or(ReconcileError::CredentialNotFound(id))?;

        let dependents = self.stores.repos.list_by_credential(id).await?;

        if delete_repos {
            for repo in &dependents {
                self.delete_repository(repo.id, unschedule).await?;
            }
        } else if !dependents.is_empty() {
            self.stores.repos.clear_credential(id).await?;
            info!(
                "Unlinked credential {} from {} repositories",
                credential.name,
                dependents.len()
            );
        }

        self.stores.credentials.delete(id).await?;
        info!("Credential {} deleted", credential.name);
        Ok(())
    }

    // =============================================================================
    // Per-repository locks
    // =============================================================================

    fn repo_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    fn forget_lock(&self, id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.remove(&id);
    }
}
