//! Capability traits over the cluster
//!
//! The reconciler only needs a handful of cluster operations and a way to
//! turn job source into a structured document. Both are expressed as traits
//! so that the controller can be exercised without a live cluster.

use async_trait::async_trait;
use lodestar_core::domain::job::{JobDocument, JobSubmission};
use lodestar_core::domain::status::JobStatus;

use crate::NomadClient;
use crate::error::Result;
use crate::jobs::JobDiff;

/// Cluster operations used by the reconciler
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create or update a job, returning its effective identifier
    async fn register_job(&self, job: &JobDocument, submission: &JobSubmission) -> Result<String>;

    /// Remove a job, optionally purging it from history
    async fn deregister_job(&self, job_id: &str, purge: bool) -> Result<()>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;

    /// Live status of a job; unknown jobs are reported with `exists == false`
    async fn job_status(&self, job_id: &str) -> Result<JobStatus>;

    /// Dry-run a job against its live version
    async fn plan_job(&self, job: &JobDocument) -> Result<JobDiff>;
}

/// Turns raw job file content into a submittable document
#[async_trait]
pub trait JobParser: Send + Sync {
    async fn parse(&self, path: &str, content: &[u8]) -> Result<(JobDocument, JobSubmission)>;
}

#[async_trait]
impl ClusterGateway for NomadClient {
    async fn register_job(&self, job: &JobDocument, submission: &JobSubmission) -> Result<String> {
        NomadClient::register_job(self, job, submission).await
    }

    async fn deregister_job(&self, job_id: &str, purge: bool) -> Result<()> {
        NomadClient::deregister_job(self, job_id, purge).await
    }

    async fn ping(&self) -> Result<()> {
        NomadClient::ping(self).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        self.fetch_job_status(job_id).await
    }

    async fn plan_job(&self, job: &JobDocument) -> Result<JobDiff> {
        NomadClient::plan_job(self, job).await
    }
}

#[async_trait]
impl JobParser for NomadClient {
    async fn parse(&self, path: &str, content: &[u8]) -> Result<(JobDocument, JobSubmission)> {
        self.parse_job_source(path, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_behind_trait_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/status/leader"))
            .respond_with(ResponseTemplate::new(200).set_body_json("10.0.0.1:4647"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/job/web"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Arc::new(NomadClient::new(server.uri()));
        let gateway: Arc<dyn ClusterGateway> = client.clone();
        let _parser: Arc<dyn JobParser> = client;

        gateway.ping().await.unwrap();
        assert!(!gateway.job_status("web").await.unwrap().exists);
    }
}
