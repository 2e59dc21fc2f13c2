//! Nomad API payloads
//!
//! Nomad speaks PascalCase JSON and freely returns `null` for empty
//! collections, so most fields here are defaulted.

use lodestar_core::domain::job::JobDocument;
use lodestar_core::domain::status::{AllocationCounts, AllocationStatus};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Treats an explicit `null` like a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Job Submission
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RegisterRequest<'a> {
    pub job: &'a JobDocument,
    pub submission: SubmissionPayload<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SubmissionPayload<'a> {
    pub source: &'a str,
    pub format: &'a str,
    pub variable_flags: HashMap<String, String>,
    pub variables: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RegisterResponse {
    #[serde(rename = "EvalID", default)]
    pub eval_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PlanRequest<'a> {
    pub job: &'a JobDocument,
    pub diff: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParseRequest<'a> {
    #[serde(rename = "JobHCL")]
    pub job_hcl: &'a str,
    #[serde(rename = "Canonicalize")]
    pub canonicalize: bool,
}

// =============================================================================
// Job Status
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct JobInfo {
    #[serde(rename = "ID", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub r#type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct JobSummary {
    #[serde(default)]
    pub summary: Option<HashMap<String, TaskGroupSummary>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct TaskGroupSummary {
    pub queued: u32,
    pub starting: u32,
    pub running: u32,
    pub failed: u32,
    pub lost: u32,
    pub unknown: u32,
}

impl From<&TaskGroupSummary> for AllocationCounts {
    fn from(group: &TaskGroupSummary) -> Self {
        AllocationCounts {
            running: group.running,
            starting: group.starting,
            queued: group.queued,
            failed: group.failed,
            lost: group.lost,
            unknown: group.unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Deployment {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AllocationStub {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub client_status: String,
    #[serde(default)]
    pub desired_status: String,
    #[serde(default)]
    pub task_group: String,
    #[serde(default)]
    pub deployment_status: Option<AllocDeploymentStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AllocDeploymentStatus {
    #[serde(default)]
    pub healthy: Option<bool>,
}

impl From<AllocationStub> for AllocationStatus {
    fn from(alloc: AllocationStub) -> Self {
        AllocationStatus {
            id: alloc.id,
            name: alloc.name,
            client: alloc.node_name,
            status: alloc.client_status.to_lowercase(),
            desired: alloc.desired_status.to_lowercase(),
            group: alloc.task_group,
            healthy: alloc.deployment_status.and_then(|d| d.healthy),
        }
    }
}
