//! Job status and health derivation
//!
//! The cluster reports raw telemetry (allocation counts per task group, the
//! latest deployment, the job's own status field). [`derive_status`] turns it
//! into a single deterministic health classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Live status of a cluster job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// Lowercased job type (`service`, `batch`, ...)
    pub job_type: String,
    /// Lowercased raw job status as reported by the cluster
    pub status: String,
    pub status_description: String,
    /// `false` when the cluster does not know the job
    pub exists: bool,
    pub allocations: AllocationCounts,
    pub derived_status: DerivedStatus,
    pub derived_status_reason: String,
    pub latest_deployment_id: Option<String>,
    pub latest_allocation_id: Option<String>,
    pub latest_allocation_name: Option<String>,
    pub allocation_summaries: Vec<AllocationStatus>,
}

impl JobStatus {
    /// Status for a job the cluster does not know about
    pub fn absent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            exists: false,
            ..Default::default()
        }
    }
}

/// Summary of a single allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStatus {
    pub id: String,
    pub name: String,
    pub client: String,
    pub status: String,
    pub desired: String,
    pub group: String,
    pub healthy: Option<bool>,
}

/// Allocation counts summed across all task groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCounts {
    pub running: u32,
    pub starting: u32,
    pub queued: u32,
    pub failed: u32,
    pub lost: u32,
    pub unknown: u32,
}

impl AllocationCounts {
    /// Sum of all six buckets
    pub fn desired(&self) -> u32 {
        self.running + self.starting + self.queued + self.failed + self.lost + self.unknown
    }

    /// Human readable summary, e.g. `3/5 allocations running`
    pub fn summary(&self) -> String {
        format!("{}/{} allocations running", self.running, self.desired())
    }
}

impl std::ops::Add for AllocationCounts {
    type Output = AllocationCounts;

    fn add(self, rhs: Self) -> Self::Output {
        AllocationCounts {
            running: self.running + rhs.running,
            starting: self.starting + rhs.starting,
            queued: self.queued + rhs.queued,
            failed: self.failed + rhs.failed,
            lost: self.lost + rhs.lost,
            unknown: self.unknown + rhs.unknown,
        }
    }
}

impl std::iter::Sum for AllocationCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(AllocationCounts::default(), |acc, counts| acc + counts)
    }
}

/// Health classification derived from cluster telemetry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DerivedStatus {
    Healthy,
    Degraded,
    Deploying,
    Failed,
    Lost,
    /// Raw cluster status used when nothing more specific applies
    Other(String),
}

impl DerivedStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DerivedStatus::Healthy => "healthy",
            DerivedStatus::Degraded => "degraded",
            DerivedStatus::Deploying => "deploying",
            DerivedStatus::Failed => "failed",
            DerivedStatus::Lost => "lost",
            DerivedStatus::Other(raw) => raw,
        }
    }
}

impl Default for DerivedStatus {
    fn default() -> Self {
        DerivedStatus::Other(String::new())
    }
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for DerivedStatus {
    fn from(value: &str) -> Self {
        match value {
            "healthy" => DerivedStatus::Healthy,
            "degraded" => DerivedStatus::Degraded,
            "deploying" => DerivedStatus::Deploying,
            "failed" => DerivedStatus::Failed,
            "lost" => DerivedStatus::Lost,
            other => DerivedStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for DerivedStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DerivedStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DerivedStatus::from(raw.as_str()))
    }
}

/// Classifies a job from its allocation counts
///
/// Precedence: any failed allocation, then any lost allocation, then the
/// running/desired ratio, then pending work, and finally the raw job status.
pub fn derive_from_allocations(counts: &AllocationCounts, raw_status: &str) -> DerivedStatus {
    let desired = counts.desired();

    if counts.failed > 0 {
        DerivedStatus::Failed
    } else if counts.lost > 0 {
        DerivedStatus::Lost
    } else if counts.running > 0 && counts.running == desired {
        DerivedStatus::Healthy
    } else if counts.running > 0 && counts.running < desired {
        DerivedStatus::Degraded
    } else if counts.starting > 0 || counts.queued > 0 {
        DerivedStatus::Deploying
    } else {
        DerivedStatus::Other(raw_status.to_lowercase())
    }
}

/// Classifies a job from its latest deployment status
///
/// Returns `None` for deployment states that carry no health signal.
pub fn derive_from_deployment(deployment_status: &str) -> Option<DerivedStatus> {
    match deployment_status.to_lowercase().as_str() {
        "successful" => Some(DerivedStatus::Healthy),
        "running" | "pending" | "unblocking" => Some(DerivedStatus::Deploying),
        "failed" | "cancelled" | "blocked" => Some(DerivedStatus::Failed),
        _ => None,
    }
}

/// Derives the health classification and its reason string
///
/// `counts` is `None` when the allocation summary could not be fetched;
/// `deployment_status` is `None` when the job has no deployment.
pub fn derive_status(
    counts: Option<&AllocationCounts>,
    deployment_status: Option<&str>,
    raw_status: &str,
) -> (DerivedStatus, String) {
    let reason = counts.copied().unwrap_or_default().summary();

    let derived = match counts {
        Some(counts) => derive_from_allocations(counts, raw_status),
        None => deployment_status
            .and_then(derive_from_deployment)
            .unwrap_or_else(|| DerivedStatus::Other(raw_status.to_lowercase())),
    };

    (derived, reason)
}
