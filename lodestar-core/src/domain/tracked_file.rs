//! Tracked job file domain type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted link between a job-spec file and the cluster job it registered
///
/// `path` is unique within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub repo_id: Uuid,
    pub path: String,
    /// Commit the file was last successfully applied at
    pub last_commit: Option<String>,
    /// Scheduler-assigned job identifier, present once registration succeeded
    pub job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedFile {
    /// The job identifier, ignoring empty values
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref().filter(|id| !id.is_empty())
    }
}
