//! Shared fixtures for tests

use async_trait::async_trait;
use chrono::Utc;
use git2::{IndexAddOption, RepositoryInitOptions, Signature};
use lodestar_client::{ClientError, ClusterGateway, JobDiff, JobParser};
use lodestar_core::domain::credential::CredentialPayload;
use lodestar_core::domain::job::{JobDocument, JobSubmission};
use lodestar_core::domain::repository::Repository;
use lodestar_core::domain::status::JobStatus;
use lodestar_core::domain::tracked_file::TrackedFile;
use lodestar_core::dto::credential::CreateCredential;
use lodestar_core::dto::repository::CreateRepository;
use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::crypto::Encryptor;
use crate::db::test_pool;
use crate::repository::Stores;
use crate::service::ReconcileManager;
use crate::sync::GitSync;

/// A throwaway git repository standing in for a remote, on branch `main`
pub struct Remote {
    dir: tempfile::TempDir,
    repo: git2::Repository,
}

impl Remote {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = git2::Repository::init_opts(dir.path(), &opts).unwrap();
        Self { dir, repo }
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.dir.path().join(relative)).unwrap();
    }

    /// Commits the whole tree, including deletions, and returns the hash
    pub fn commit(&self, message: &str) -> String {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Tester", "tester@example.com").unwrap();
        let parent = self.repo.head().ok().map(|h| h.peel_to_commit().unwrap());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    pub fn url(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }
}

/// An unsaved repository record pointing at `url`
pub fn repository(url: String, job_path: Option<&str>) -> Repository {
    let now = Utc::now();
    Repository {
        id: Uuid::new_v4(),
        name: "demo".to_string(),
        repo_url: url,
        branch: "main".to_string(),
        job_path: job_path.map(str::to_string),
        credential_id: None,
        created_at: now,
        updated_at: now,
        last_commit: None,
        last_commit_author: None,
        last_commit_title: None,
        last_polled_at: None,
    }
}

/// A job file body the [`JsonParser`] understands
pub fn job(id: &str, job_type: &str) -> String {
    serde_json::json!({ "ID": id, "Name": id, "Type": job_type }).to_string()
}

/// Observable state of a [`FakeCluster`], mutable between calls
#[derive(Default)]
pub struct ClusterState {
    pub live: HashSet<String>,
    pub registered: Vec<JobDocument>,
    pub deregistered: Vec<(String, bool)>,
    pub status_calls: usize,
    pub plans: usize,
    pub plan_diff: JobDiff,
    pub fail_register: bool,
    pub fail_status: bool,
    pub fail_deregister: bool,
    pub fail_ping: bool,
}

/// In-memory cluster that records every call
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn register_job(
        &self,
        job: &JobDocument,
        _submission: &JobSubmission,
    ) -> lodestar_client::Result<String> {
        let id = job
            .job_id()
            .ok_or_else(|| ClientError::InvalidRequest("missing job id".to_string()))?
            .to_string();
        let mut state = self.state();
        if state.fail_register {
            return Err(ClientError::api(500, "rpc error: no leader"));
        }
        state.live.insert(id.clone());
        state.registered.push(job.clone());
        Ok(id)
    }

    async fn deregister_job(&self, job_id: &str, purge: bool) -> lodestar_client::Result<()> {
        let mut state = self.state();
        if state.fail_deregister {
            return Err(ClientError::api(500, "rpc error: no leader"));
        }
        state.live.remove(job_id);
        state.deregistered.push((job_id.to_string(), purge));
        Ok(())
    }

    async fn ping(&self) -> lodestar_client::Result<()> {
        if self.state().fail_ping {
            return Err(ClientError::api(500, "rpc error: no leader"));
        }
        Ok(())
    }

    async fn job_status(&self, job_id: &str) -> lodestar_client::Result<JobStatus> {
        let mut state = self.state();
        state.status_calls += 1;
        if state.fail_status {
            return Err(ClientError::api(500, "rpc error: no leader"));
        }
        if state.live.contains(job_id) {
            Ok(JobStatus {
                id: job_id.to_string(),
                exists: true,
                status: "running".to_string(),
                ..Default::default()
            })
        } else {
            Ok(JobStatus::absent(job_id))
        }
    }

    async fn plan_job(&self, _job: &JobDocument) -> lodestar_client::Result<JobDiff> {
        let mut state = self.state();
        state.plans += 1;
        Ok(state.plan_diff.clone())
    }
}

/// Reads job files as JSON documents
pub struct JsonParser;

#[async_trait]
impl JobParser for JsonParser {
    async fn parse(
        &self,
        path: &str,
        content: &[u8],
    ) -> lodestar_client::Result<(JobDocument, JobSubmission)> {
        let document = serde_json::from_slice(content).map_err(|e| ClientError::InvalidJob {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok((
            document,
            JobSubmission {
                source: String::from_utf8_lossy(content).into_owned(),
                format: "json".to_string(),
            },
        ))
    }
}

/// A reconciliation manager over in-memory stores, a [`FakeCluster`] and a
/// local [`Remote`]
pub struct Harness {
    pub manager: Arc<ReconcileManager>,
    pub cluster: Arc<FakeCluster>,
    pub stores: Stores,
    pub git: GitSync,
    pub remote: Remote,
    pub workdir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_plan(false).await
    }

    pub async fn with_plan(plan_before_apply: bool) -> Self {
        let stores = Stores::sqlite(
            test_pool().await,
            Encryptor::from_hex(&"22".repeat(32)).unwrap(),
        );
        let workdir = tempfile::tempdir().unwrap();
        let git = GitSync::new(workdir.path());
        let cluster = Arc::new(FakeCluster::default());
        let manager = ReconcileManager::new(
            stores.clone(),
            git.clone(),
            cluster.clone(),
            Arc::new(JsonParser),
        )
        .with_plan_before_apply(plan_before_apply);

        Self {
            manager: Arc::new(manager),
            cluster,
            stores,
            git,
            remote: Remote::new(),
            workdir,
        }
    }

    pub async fn add_repo(&self, url: String, credential_id: Option<Uuid>) -> Repository {
        self.stores
            .repos
            .create(CreateRepository {
                name: "apps".to_string(),
                repo_url: url,
                branch: "main".to_string(),
                job_path: None,
                credential_id,
            })
            .await
            .unwrap()
    }

    pub async fn add_credential(&self, name: &str) -> Uuid {
        self.stores
            .credentials
            .create(CreateCredential {
                name: name.to_string(),
                payload: CredentialPayload::HttpsToken {
                    username: None,
                    token: "ghp_example".to_string(),
                },
            })
            .await
            .unwrap()
            .id
    }

    pub async fn tracked(&self, repo_id: Uuid) -> Vec<TrackedFile> {
        self.stores.files.list_by_repo(repo_id).await.unwrap()
    }

    pub async fn reload(&self, repo_id: Uuid) -> Option<Repository> {
        self.stores.repos.get(repo_id).await.unwrap()
    }
}
