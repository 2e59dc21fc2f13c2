//! Repository domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job-spec subpath searched when a repository does not configure one
pub const DEFAULT_JOB_PATH: &str = ".nomad";

/// A git repository tracked by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    /// Subpath (directory or single file) holding job specifications
    pub job_path: Option<String>,
    pub credential_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_commit: Option<String>,
    pub last_commit_author: Option<String>,
    pub last_commit_title: Option<String>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// The configured job path, or [`DEFAULT_JOB_PATH`] when unset or blank
    pub fn job_path(&self) -> &str {
        match self.job_path.as_deref() {
            Some(path) if !path.trim().is_empty() => path,
            _ => DEFAULT_JOB_PATH,
        }
    }

    /// Whether `commit` differs from the last recorded commit
    ///
    /// A repository that has never recorded a commit always reports a change.
    pub fn commit_changed(&self, commit: &str) -> bool {
        self.last_commit.as_deref() != Some(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> Repository {
        let now = Utc::now();
        Repository {
            id: Uuid::new_v4(),
            name: "demo".to_string(),
            repo_url: "https://example.com/demo.git".to_string(),
            branch: "main".to_string(),
            job_path: None,
            credential_id: None,
            created_at: now,
            updated_at: now,
            last_commit: None,
            last_commit_author: None,
            last_commit_title: None,
            last_polled_at: None,
        }
    }

    #[test]
    fn test_job_path_defaults() {
        let mut repo = repository();
        assert_eq!(repo.job_path(), ".nomad");

        repo.job_path = Some("  ".to_string());
        assert_eq!(repo.job_path(), ".nomad");

        repo.job_path = Some("deploy/jobs".to_string());
        assert_eq!(repo.job_path(), "deploy/jobs");
    }

    #[test]
    fn test_commit_changed() {
        let mut repo = repository();
        assert!(repo.commit_changed("abc"));

        repo.last_commit = Some("abc".to_string());
        assert!(!repo.commit_changed("abc"));
        assert!(repo.commit_changed("def"));
    }
}
