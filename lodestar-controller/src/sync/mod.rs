//! Repository sync engine
//!
//! Keeps one working copy per repository under the configured base directory
//! and turns it into a [`Snapshot`] of the tracked branch. libgit2 is
//! blocking, so every sync runs on the blocking thread pool. Callers must not
//! sync the same repository concurrently.

mod auth;
mod discovery;

use auth::GitAuth;
use discovery::{discover_job_files, search_root};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, ErrorCode, FetchOptions};
use lodestar_core::domain::credential::CredentialPayload;
use lodestar_core::domain::repository::Repository;
use lodestar_core::domain::snapshot::{Snapshot, commit_author, commit_title};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const REMOTE_NAME: &str = "origin";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("clone {url}: {source}")]
    Clone { url: String, source: git2::Error },

    #[error("open working copy {path}: {source}")]
    Open { path: PathBuf, source: git2::Error },

    #[error("pull branch {branch}: {source}")]
    Pull { branch: String, source: git2::Error },

    #[error("checkout branch {branch}: {source}")]
    Checkout { branch: String, source: git2::Error },

    #[error("read head commit: {0}")]
    Head(git2::Error),

    #[error("no job files found in {}", .0.display())]
    NoJobFiles(PathBuf),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    fn io(path: &Path, source: io::Error) -> Self {
        SyncError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Git-backed repository sync engine
#[derive(Debug, Clone)]
pub struct GitSync {
    base_dir: PathBuf,
}

impl GitSync {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Working copy location, derived from the repository identity only
    pub fn repo_dir(&self, repo_id: Uuid) -> PathBuf {
        self.base_dir.join(format!("repo-{}", repo_id))
    }

    /// Brings the working copy up to date and snapshots its job files
    pub async fn sync(
        &self,
        repo: &Repository,
        payload: Option<&CredentialPayload>,
    ) -> Result<Snapshot, SyncError> {
        let auth = GitAuth::from_payload(payload)?;
        let request = SyncRequest {
            base_dir: self.base_dir.clone(),
            dir: self.repo_dir(repo.id),
            url: repo.repo_url.clone(),
            branch: repo.branch.clone(),
            job_path: repo.job_path().to_string(),
        };

        tokio::task::spawn_blocking(move || request.run(&auth))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// Deletes the working copy; succeeds when there is none
    pub async fn remove_repo(&self, repo_id: Uuid) -> Result<(), SyncError> {
        let dir = self.repo_dir(repo_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Removed working copy {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(&dir, e)),
        }
    }
}

struct SyncRequest {
    base_dir: PathBuf,
    dir: PathBuf,
    url: String,
    branch: String,
    job_path: String,
}

impl SyncRequest {
    fn run(&self, auth: &GitAuth) -> Result<Snapshot, SyncError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| SyncError::io(&self.base_dir, e))?;

        let repo = match git2::Repository::open(&self.dir) {
            Ok(repo) => {
                self.pull(&repo, auth)?;
                repo
            }
            Err(e) if e.code() == ErrorCode::NotFound => self.clone_fresh(auth)?,
            Err(source) => {
                return Err(SyncError::Open {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(SyncError::Head)?;
        let author = commit.author();
        let message = String::from_utf8_lossy(commit.message_bytes());

        let job_files = discover_job_files(&self.dir, &self.job_path)?;
        if job_files.is_empty() {
            return Err(SyncError::NoJobFiles(search_root(&self.dir, &self.job_path)));
        }

        Ok(Snapshot {
            repo_path: self.dir.clone(),
            commit_hash: commit.id().to_string(),
            commit_author: commit_author(
                &String::from_utf8_lossy(author.name_bytes()),
                &String::from_utf8_lossy(author.email_bytes()),
            ),
            commit_title: commit_title(&message).to_string(),
            job_files,
        })
    }

    /// Shallow, single-branch clone; a failed clone leaves nothing behind
    fn clone_fresh(&self, auth: &GitAuth) -> Result<git2::Repository, SyncError> {
        if self.dir.exists() {
            // Leftover from an interrupted clone
            std::fs::remove_dir_all(&self.dir).map_err(|e| SyncError::io(&self.dir, e))?;
        }

        info!("Cloning {} (branch {})", self.url, self.branch);

        let refspec = self.refspec();
        let mut builder = RepoBuilder::new();
        builder
            .branch(&self.branch)
            .fetch_options(self.fetch_options(auth))
            .remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));

        builder.clone(&self.url, &self.dir).map_err(|source| {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial clone {}: {}", self.dir.display(), e);
                }
            }
            SyncError::Clone {
                url: self.url.clone(),
                source,
            }
        })
    }

    /// Fetches the branch and force-moves the working copy onto it
    fn pull(&self, repo: &git2::Repository, auth: &GitAuth) -> Result<(), SyncError> {
        let pull_err = |source| SyncError::Pull {
            branch: self.branch.clone(),
            source,
        };

        let mut remote = repo.find_remote(REMOTE_NAME).map_err(pull_err)?;
        remote
            .fetch(&[self.refspec()], Some(&mut self.fetch_options(auth)), None)
            .map_err(pull_err)?;

        let target = repo
            .find_reference(&format!("refs/remotes/{}/{}", REMOTE_NAME, self.branch))
            .and_then(|reference| reference.peel_to_commit())
            .map_err(pull_err)?;

        let checkout_err = |source| SyncError::Checkout {
            branch: self.branch.clone(),
            source,
        };
        let local_ref = format!("refs/heads/{}", self.branch);

        // Check out before moving the branch so files deleted upstream are
        // removed relative to the old HEAD.
        repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(checkout_err)?;
        repo.reference(&local_ref, target.id(), true, "lodestar: sync")
            .map_err(checkout_err)?;
        repo.set_head(&local_ref).map_err(checkout_err)?;

        debug!("Working copy {} at {}", self.dir.display(), target.id());
        Ok(())
    }

    fn refspec(&self) -> String {
        format!(
            "+refs/heads/{0}:refs/remotes/{1}/{0}",
            self.branch, REMOTE_NAME
        )
    }

    fn fetch_options<'a>(&self, auth: &'a GitAuth) -> FetchOptions<'a> {
        let mut options = FetchOptions::new();
        options
            .remote_callbacks(auth.callbacks())
            .download_tags(AutotagOption::None);
        // The local transport cannot negotiate shallow history
        if !is_local_remote(&self.url) {
            options.depth(1);
        }
        options
    }
}

fn is_local_remote(url: &str) -> bool {
    url.starts_with("file://") || Path::new(url).is_absolute() || Path::new(url).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Remote, repository};
    use std::fs;

    #[tokio::test]
    async fn test_clone_then_pull() {
        let remote = Remote::new();
        remote.write(".nomad/web.nomad", "job \"web\" {}");
        remote.write(".nomad/api.nomad.hcl", "job \"api\" {}");
        let first = remote.commit("Add jobs\n\nInitial set of services");

        let base = tempfile::tempdir().unwrap();
        let engine = GitSync::new(base.path());
        let repo = repository(remote.url(), None);

        let snapshot = engine.sync(&repo, None).await.unwrap();
        assert_eq!(snapshot.commit_hash, first);
        assert_eq!(snapshot.commit_author, "Tester <tester@example.com>");
        assert_eq!(snapshot.commit_title, "Add jobs");
        assert_eq!(snapshot.repo_path, engine.repo_dir(repo.id));
        let paths: Vec<_> = snapshot.job_files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec![".nomad/api.nomad.hcl", ".nomad/web.nomad"]);

        remote.remove(".nomad/api.nomad.hcl");
        remote.write(".nomad/web.nomad", "job \"web\" { group \"g\" {} }");
        let second = remote.commit("Drop api");

        let snapshot = engine.sync(&repo, None).await.unwrap();
        assert_eq!(snapshot.commit_hash, second);
        assert_eq!(snapshot.commit_title, "Drop api");
        assert_eq!(snapshot.job_files.len(), 1);
        assert_eq!(snapshot.job_files[0].content, b"job \"web\" { group \"g\" {} }");

        // Nothing new upstream is still a successful sync
        let again = engine.sync(&repo, None).await.unwrap();
        assert_eq!(again.commit_hash, second);
    }

    #[tokio::test]
    async fn test_pull_discards_local_edits() {
        let remote = Remote::new();
        remote.write(".nomad/web.nomad", "job \"web\" {}");
        remote.commit("Add web");

        let base = tempfile::tempdir().unwrap();
        let engine = GitSync::new(base.path());
        let repo = repository(remote.url(), None);
        engine.sync(&repo, None).await.unwrap();

        let local = engine.repo_dir(repo.id).join(".nomad/web.nomad");
        fs::write(&local, "tampered").unwrap();
        remote.write(".nomad/web.nomad", "job \"web\" { count = 2 }");
        remote.commit("Scale web");

        engine.sync(&repo, None).await.unwrap();
        assert_eq!(fs::read_to_string(&local).unwrap(), "job \"web\" { count = 2 }");
    }

    #[tokio::test]
    async fn test_no_job_files_names_search_root() {
        let remote = Remote::new();
        remote.write("README.md", "nothing to deploy");
        remote.commit("Initial commit");

        let base = tempfile::tempdir().unwrap();
        let engine = GitSync::new(base.path());
        let repo = repository(remote.url(), Some("deploy"));

        let err = engine.sync(&repo, None).await.unwrap_err();
        assert!(matches!(err, SyncError::NoJobFiles(_)));
        let expected = engine.repo_dir(repo.id).join("deploy");
        assert!(err.to_string().contains(&expected.display().to_string()));
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing_behind() {
        let base = tempfile::tempdir().unwrap();
        let engine = GitSync::new(base.path());
        let missing = base.path().join("does-not-exist");
        let repo = repository(missing.to_string_lossy().into_owned(), None);

        let err = engine.sync(&repo, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Clone { .. }));
        assert!(!engine.repo_dir(repo.id).exists());
    }

    #[tokio::test]
    async fn test_remove_repo_is_idempotent() {
        let remote = Remote::new();
        remote.write("jobs/cache.nomad", "job \"cache\" {}");
        remote.commit("Add cache");

        let base = tempfile::tempdir().unwrap();
        let engine = GitSync::new(base.path());
        let repo = repository(remote.url(), Some("jobs"));
        engine.sync(&repo, None).await.unwrap();
        assert!(engine.repo_dir(repo.id).exists());

        engine.remove_repo(repo.id).await.unwrap();
        assert!(!engine.repo_dir(repo.id).exists());
        engine.remove_repo(repo.id).await.unwrap();
    }

    #[test]
    fn test_local_remote_detection() {
        assert!(is_local_remote("file:///srv/git/apps.git"));
        assert!(is_local_remote("/srv/git/apps.git"));
        assert!(!is_local_remote("https://github.com/acme/apps.git"));
        assert!(!is_local_remote("git@github.com:acme/apps.git"));
    }
}
