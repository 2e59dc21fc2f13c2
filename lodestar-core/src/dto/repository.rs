//! Repository DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::Repository;
use crate::domain::status::JobStatus;
use crate::domain::tracked_file::TrackedFile;

/// Status reported for a tracked job the cluster no longer knows
pub const STATUS_MISSING: &str = "missing";

/// Request to start tracking a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepository {
    pub name: String,
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub job_path: Option<String>,
    #[serde(default)]
    pub credential_id: Option<Uuid>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl CreateRepository {
    /// Checks required fields, returning a message describing the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.repo_url.trim().is_empty() {
            return Err("repo_url is required".to_string());
        }
        if self.branch.trim().is_empty() {
            return Err("branch cannot be empty".to_string());
        }
        Ok(())
    }
}

/// A repository and its tracked jobs, as listed to operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryOverview {
    #[serde(flatten)]
    pub repository: Repository,
    pub jobs: Vec<RepositoryJob>,
}

/// One tracked job file, enriched with live status when available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryJob {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Derived status, or [`STATUS_MISSING`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<JobStatus>,
}

impl From<&TrackedFile> for RepositoryJob {
    fn from(file: &TrackedFile) -> Self {
        Self {
            path: file.path.clone(),
            job_id: file.job_id().map(str::to_string),
            last_commit: file.last_commit.clone(),
            updated_at: file.updated_at,
            status: None,
            status_description: None,
            status_error: None,
            live: None,
        }
    }
}

impl RepositoryJob {
    /// Applies a live status lookup
    pub fn with_status(mut self, status: JobStatus) -> Self {
        if !status.exists {
            self.status = Some(STATUS_MISSING.to_string());
            self.status_description = Some("Job not found in cluster".to_string());
            return self;
        }

        self.status = Some(status.derived_status.to_string());
        self.status_description = Some(if status.derived_status_reason.is_empty() {
            status.status_description.clone()
        } else {
            status.derived_status_reason.clone()
        });
        self.live = Some(status);
        self
    }

    /// Records a failed status lookup
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.status_error = Some(error.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::DerivedStatus;

    fn tracked(job_id: Option<&str>) -> TrackedFile {
        TrackedFile {
            repo_id: Uuid::new_v4(),
            path: ".nomad/web.nomad".to_string(),
            last_commit: Some("abc123".to_string()),
            job_id: job_id.map(str::to_string),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_view_reports_missing_jobs() {
        let job = RepositoryJob::from(&tracked(Some("web"))).with_status(JobStatus::absent("web"));
        assert_eq!(job.status.as_deref(), Some(STATUS_MISSING));
        assert!(job.live.is_none());
    }

    #[test]
    fn test_job_view_prefers_derived_reason() {
        let status = JobStatus {
            id: "web".to_string(),
            exists: true,
            status_description: "raw".to_string(),
            derived_status: DerivedStatus::Degraded,
            derived_status_reason: "3/5 allocations running".to_string(),
            ..Default::default()
        };
        let job = RepositoryJob::from(&tracked(Some("web"))).with_status(status);
        assert_eq!(job.status.as_deref(), Some("degraded"));
        assert_eq!(job.status_description.as_deref(), Some("3/5 allocations running"));
        assert!(job.live.is_some());
    }

    #[test]
    fn test_job_view_without_job_id_serializes_compactly() {
        let job = RepositoryJob::from(&tracked(None));
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("job_id").is_none());
        assert!(value.get("status").is_none());
        assert_eq!(value["path"], ".nomad/web.nomad");
    }

    #[test]
    fn test_branch_defaults_to_main() {
        let req: CreateRepository = serde_json::from_value(serde_json::json!({
            "name": "demo",
            "repo_url": "https://example.com/demo.git",
        }))
        .unwrap();
        assert_eq!(req.branch, "main");
        assert!(req.job_path.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let req = CreateRepository {
            name: " ".to_string(),
            repo_url: "https://example.com/demo.git".to_string(),
            branch: "main".to_string(),
            job_path: None,
            credential_id: None,
        };
        assert_eq!(req.validate(), Err("name is required".to_string()));
    }
}
