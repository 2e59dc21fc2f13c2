//! Job submission endpoints

use lodestar_core::domain::job::{JobDocument, JobSubmission, META_PREFIX};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::NomadClient;
use crate::error::{ClientError, Result};
use crate::wire::{
    ParseRequest, PlanRequest, RegisterRequest, RegisterResponse, SubmissionPayload,
    null_as_default,
};

/// Format tag recorded with every submitted job source
pub const SUBMISSION_FORMAT: &str = "hcl2";

/// Result of a dry-run plan against the live job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobDiff {
    #[serde(rename = "Type", default)]
    pub diff_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<DiffEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub objects: Vec<DiffEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_groups: Vec<DiffEntry>,
}

/// A single field, object or task group edit within a [`JobDiff`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiffEntry {
    #[serde(rename = "Type", default)]
    pub diff_type: String,
    #[serde(default)]
    pub name: String,
}

impl DiffEntry {
    fn is_edit(&self) -> bool {
        !self.diff_type.is_empty() && !self.diff_type.eq_ignore_ascii_case("none")
    }

    fn is_provenance_meta(&self) -> bool {
        self.name
            .strip_prefix("Meta[")
            .is_some_and(|key| key.starts_with(META_PREFIX))
    }
}

impl JobDiff {
    /// Whether re-submitting would change anything beyond provenance metadata
    pub fn is_meaningful(&self) -> bool {
        if self.diff_type.is_empty() || self.diff_type.eq_ignore_ascii_case("none") {
            return false;
        }

        self.fields
            .iter()
            .any(|field| field.is_edit() && !field.is_provenance_meta())
            || self.objects.iter().any(DiffEntry::is_edit)
            || self.task_groups.iter().any(DiffEntry::is_edit)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlanResponse {
    #[serde(default)]
    diff: Option<JobDiff>,
}

impl NomadClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Register (create or update) a job
    ///
    /// The raw source is sent along so the cluster keeps it in the job's
    /// version history.
    ///
    /// # Returns
    /// The effective job identifier (explicit ID, else name)
    pub async fn register_job(&self, job: &JobDocument, submission: &JobSubmission) -> Result<String> {
        let job_id = job
            .job_id()
            .ok_or_else(|| ClientError::InvalidRequest("job has neither ID nor Name".to_string()))?
            .to_string();

        let body = RegisterRequest {
            job,
            submission: SubmissionPayload {
                source: &submission.source,
                format: &submission.format,
                variable_flags: HashMap::new(),
                variables: "",
            },
        };

        let response = self
            .request(Method::POST, &["v1", "jobs"])?
            .json(&body)
            .send()
            .await?;
        let registered: RegisterResponse = self.handle_response(response).await?;

        debug!("Registered job {} (evaluation {})", job_id, registered.eval_id);
        if !registered.warnings.is_empty() {
            warn!("Nomad warnings for job {}: {}", job_id, registered.warnings);
        }

        Ok(job_id)
    }

    /// Deregister a job, optionally purging its history
    pub async fn deregister_job(&self, job_id: &str, purge: bool) -> Result<()> {
        let response = self
            .request(Method::DELETE, &["v1", "job", job_id])?
            .query(&[("purge", purge)])
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Dry-run a job against its live version
    pub async fn plan_job(&self, job: &JobDocument) -> Result<JobDiff> {
        let job_id = job
            .job_id()
            .ok_or_else(|| ClientError::InvalidRequest("job has neither ID nor Name".to_string()))?;

        let response = self
            .request(Method::POST, &["v1", "job", job_id, "plan"])?
            .json(&PlanRequest { job, diff: true })
            .send()
            .await?;
        let plan: PlanResponse = self.handle_response(response).await?;

        Ok(plan.diff.unwrap_or_default())
    }

    /// Check connectivity by asking for the current cluster leader
    pub async fn ping(&self) -> Result<()> {
        let _leader: String = self.get_json(&["v1", "status", "leader"]).await?;
        Ok(())
    }

    // =============================================================================
    // Job Specification Parsing
    // =============================================================================

    /// Convert HCL job source into a structured document
    ///
    /// Parsing is done by the cluster itself so that the accepted syntax
    /// always matches the scheduler version.
    pub async fn parse_job_source(&self, path: &str, content: &[u8]) -> Result<(JobDocument, JobSubmission)> {
        let source = std::str::from_utf8(content)
            .map_err(|e| ClientError::InvalidJob {
                path: path.to_string(),
                message: format!("not valid UTF-8: {}", e),
            })?;

        let response = self
            .request(Method::POST, &["v1", "jobs", "parse"])?
            .json(&ParseRequest {
                job_hcl: source,
                canonicalize: true,
            })
            .send()
            .await?;
        let document: JobDocument = self.handle_response(response).await.map_err(|e| match e {
            ClientError::Api { status, message } if (400..500).contains(&status) => {
                ClientError::InvalidJob {
                    path: path.to_string(),
                    message: message.trim().to_string(),
                }
            }
            other => other,
        })?;

        Ok((
            document,
            JobSubmission {
                source: source.to_string(),
                format: SUBMISSION_FORMAT.to_string(),
            },
        ))
    }
}
