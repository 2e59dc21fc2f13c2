//! Job status queries
//!
//! Combines the job record, its allocation summary, latest deployment and
//! allocation list into a single [`JobStatus`]. Only the job record lookup is
//! authoritative; the other calls are best effort.

use lodestar_core::domain::status::{AllocationCounts, AllocationStatus, JobStatus, derive_status};
use tracing::debug;

use crate::NomadClient;
use crate::error::Result;
use crate::wire::{AllocationStub, Deployment, JobInfo, JobSummary};

/// Upper bound on allocation summaries carried in a [`JobStatus`]
pub const MAX_ALLOCATION_SUMMARIES: usize = 25;

impl NomadClient {
    /// Fetch the live status of a job
    ///
    /// A job the cluster does not know about is reported with
    /// `exists == false` rather than as an error.
    pub async fn fetch_job_status(&self, job_id: &str) -> Result<JobStatus> {
        if job_id.is_empty() {
            return Ok(JobStatus::absent(job_id));
        }

        let info: JobInfo = match self.get_json(&["v1", "job", job_id]).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => return Ok(JobStatus::absent(job_id)),
            Err(e) => return Err(e),
        };

        let id = first_non_empty(&info.id, &info.name).to_string();
        let raw_status = info.status.to_lowercase();

        let counts = self.allocation_counts(&id).await;
        let deployment = self.latest_deployment(&id).await;
        let allocations = self.allocations(&id).await;

        let (derived_status, derived_status_reason) = derive_status(
            counts.as_ref(),
            deployment.as_ref().map(|d| d.status.as_str()),
            &raw_status,
        );

        let latest = allocations.first();

        Ok(JobStatus {
            name: first_non_empty(&info.name, &info.id).to_string(),
            namespace: info.namespace,
            job_type: info.r#type.to_lowercase(),
            status: raw_status,
            status_description: info.status_description,
            exists: true,
            allocations: counts.unwrap_or_default(),
            derived_status,
            derived_status_reason,
            latest_deployment_id: deployment.map(|d| d.id).filter(|id| !id.is_empty()),
            latest_allocation_id: latest.map(|a| a.id.clone()),
            latest_allocation_name: latest.map(|a| a.name.clone()),
            allocation_summaries: allocations,
            id,
        })
    }

    async fn allocation_counts(&self, job_id: &str) -> Option<AllocationCounts> {
        match self
            .get_json::<JobSummary>(&["v1", "job", job_id, "summary"])
            .await
        {
            Ok(summary) => summary
                .summary
                .map(|groups| groups.values().map(AllocationCounts::from).sum()),
            Err(e) => {
                debug!("Allocation summary unavailable for job {}: {}", job_id, e);
                None
            }
        }
    }

    async fn latest_deployment(&self, job_id: &str) -> Option<Deployment> {
        match self
            .get_json::<Option<Deployment>>(&["v1", "job", job_id, "deployment"])
            .await
        {
            Ok(deployment) => deployment,
            Err(e) => {
                debug!("Latest deployment unavailable for job {}: {}", job_id, e);
                None
            }
        }
    }

    async fn allocations(&self, job_id: &str) -> Vec<AllocationStatus> {
        let request = self
            .get_json::<Option<Vec<AllocationStub>>>(&["v1", "job", job_id, "allocations"])
            .await;

        match request {
            Ok(allocs) => allocs
                .unwrap_or_default()
                .into_iter()
                .take(MAX_ALLOCATION_SUMMARIES)
                .map(AllocationStatus::from)
                .collect(),
            Err(e) => {
                debug!("Allocations unavailable for job {}: {}", job_id, e);
                Vec::new()
            }
        }
    }
}

fn first_non_empty<'a>(primary: &'a str, fallback: &'a str) -> &'a str {
    if primary.is_empty() { fallback } else { primary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_core::domain::status::DerivedStatus;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_json(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_unknown_job_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_string("job not found"))
            .mount(&server)
            .await;

        let client = NomadClient::new(server.uri());
        let status = client.fetch_job_status("ghost").await.unwrap();
        assert!(!status.exists);
        assert_eq!(status.id, "ghost");
    }

    #[tokio::test]
    async fn test_empty_job_id_is_absent() {
        let client = NomadClient::new("http://127.0.0.1:1");
        let status = client.fetch_job_status("").await.unwrap();
        assert!(!status.exists);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/job/web"))
            .respond_with(ResponseTemplate::new(500).set_body_string("no cluster leader"))
            .mount(&server)
            .await;

        let client = NomadClient::new(server.uri());
        assert!(client.fetch_job_status("web").await.is_err());
    }

    #[tokio::test]
    async fn test_status_from_summary() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/v1/job/web",
            serde_json::json!({
                "ID": "web", "Name": "web", "Namespace": "default",
                "Type": "Service", "Status": "Running", "StatusDescription": "",
            }),
        )
        .await;
        mount_json(
            &server,
            "/v1/job/web/summary",
            serde_json::json!({
                "JobID": "web",
                "Summary": {
                    "api": { "Running": 2, "Starting": 0, "Queued": 0, "Failed": 0, "Lost": 0, "Complete": 4 },
                    "worker": { "Running": 1, "Starting": 1, "Queued": 1, "Failed": 0, "Lost": 0 },
                },
            }),
        )
        .await;
        mount_json(
            &server,
            "/v1/job/web/deployment",
            serde_json::json!({ "ID": "dep-1", "Status": "running" }),
        )
        .await;
        mount_json(
            &server,
            "/v1/job/web/allocations",
            serde_json::json!([
                {
                    "ID": "alloc-1", "Name": "web.api[0]", "NodeName": "node-a",
                    "ClientStatus": "Running", "DesiredStatus": "Run", "TaskGroup": "api",
                    "DeploymentStatus": { "Healthy": true },
                },
                {
                    "ID": "alloc-2", "Name": "web.worker[0]", "NodeName": "node-b",
                    "ClientStatus": "pending", "DesiredStatus": "run", "TaskGroup": "worker",
                    "DeploymentStatus": null,
                },
            ]),
        )
        .await;

        let client = NomadClient::new(server.uri());
        let status = client.fetch_job_status("web").await.unwrap();

        assert!(status.exists);
        assert_eq!(status.job_type, "service");
        assert_eq!(status.status, "running");
        assert_eq!(status.allocations.running, 3);
        assert_eq!(status.allocations.desired(), 5);
        assert_eq!(status.derived_status, DerivedStatus::Degraded);
        assert_eq!(status.derived_status_reason, "3/5 allocations running");
        assert_eq!(status.latest_deployment_id.as_deref(), Some("dep-1"));
        assert_eq!(status.latest_allocation_id.as_deref(), Some("alloc-1"));
        assert_eq!(status.allocation_summaries.len(), 2);
        assert_eq!(status.allocation_summaries[0].status, "running");
        assert_eq!(status.allocation_summaries[0].healthy, Some(true));
        assert_eq!(status.allocation_summaries[1].healthy, None);
    }

    #[tokio::test]
    async fn test_status_falls_back_to_deployment() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/v1/job/web",
            serde_json::json!({ "ID": "web", "Name": "web", "Type": "service", "Status": "running" }),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/v1/job/web/summary"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_json(
            &server,
            "/v1/job/web/deployment",
            serde_json::json!({ "ID": "dep-9", "Status": "successful" }),
        )
        .await;
        mount_json(&server, "/v1/job/web/allocations", serde_json::json!(null)).await;

        let client = NomadClient::new(server.uri());
        let status = client.fetch_job_status("web").await.unwrap();

        assert_eq!(status.derived_status, DerivedStatus::Healthy);
        assert_eq!(status.derived_status_reason, "0/0 allocations running");
        assert!(status.allocation_summaries.is_empty());
        assert!(status.latest_allocation_id.is_none());
    }

    #[tokio::test]
    async fn test_status_falls_back_to_raw_status() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/v1/job/nightly",
            serde_json::json!({ "ID": "nightly", "Type": "batch", "Status": "Dead" }),
        )
        .await;
        mount_json(&server, "/v1/job/nightly/summary", serde_json::json!({ "Summary": {} })).await;
        mount_json(&server, "/v1/job/nightly/deployment", serde_json::json!(null)).await;
        mount_json(&server, "/v1/job/nightly/allocations", serde_json::json!([])).await;

        let client = NomadClient::new(server.uri());
        let status = client.fetch_job_status("nightly").await.unwrap();

        assert_eq!(status.name, "nightly");
        assert_eq!(status.derived_status, DerivedStatus::Other("dead".to_string()));
        assert!(status.latest_deployment_id.is_none());
    }
}
