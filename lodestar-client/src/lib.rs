//! Lodestar Nomad Client
//!
//! A small, type-safe HTTP client for the Nomad control plane, plus the narrow
//! capability traits the reconciler is written against.
//!
//! The reconciler never sees [`NomadClient`] directly; it holds an
//! `Arc<dyn ClusterGateway>` and an `Arc<dyn JobParser>` so tests can swap in
//! deterministic doubles.
//!
//! # Example
//!
//! ```no_run
//! use lodestar_client::{ClusterGateway, NomadClient};
//!
//! # async fn example() -> lodestar_client::Result<()> {
//! let client = NomadClient::new("http://127.0.0.1:4646").with_namespace("apps");
//!
//! client.ping().await?;
//! let status = client.job_status("web").await?;
//! println!("{} is {}", status.id, status.derived_status);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod gateway;
mod jobs;
mod status;
mod wire;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use gateway::{ClusterGateway, JobParser};
pub use jobs::{DiffEntry, JobDiff, SUBMISSION_FORMAT};
pub use status::MAX_ALLOCATION_SUMMARIES;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;

/// HTTP client for the Nomad API
///
/// Requests carry the ACL token and the namespace / region selectors when
/// they are configured.
#[derive(Debug, Clone)]
pub struct NomadClient {
    /// Base URL of the Nomad agent (e.g., "http://127.0.0.1:4646")
    base_url: String,
    /// HTTP client instance
    client: Client,
    token: Option<String>,
    namespace: Option<String>,
    region: Option<String>,
}

impl NomadClient {
    /// Create a new Nomad client
    ///
    /// # Arguments
    /// * `base_url` - The address of a Nomad agent (e.g., "http://127.0.0.1:4646")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new Nomad client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: None,
            namespace: None,
            region: None,
        }
    }

    /// Sets the ACL token sent as `X-Nomad-Token`
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    /// Scopes every request to a namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into()).filter(|ns: &String| !ns.is_empty());
        self
    }

    /// Scopes every request to a region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into()).filter(|r: &String| !r.is_empty());
        self
    }

    /// Get the base URL of the Nomad agent
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Request Building
    // =============================================================================

    /// Builds the URL for an API path, escaping each segment
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid Nomad address: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidRequest("Nomad address cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Starts a request with authentication and scoping applied
    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, self.url(segments)?);

        if let Some(token) = &self.token {
            builder = builder.header("X-Nomad-Token", token);
        }
        if let Some(namespace) = &self.namespace {
            builder = builder.query(&[("namespace", namespace)]);
        }
        if let Some(region) = &self.region {
            builder = builder.query(&[("region", region)]);
        }

        Ok(builder)
    }

    /// GET a path and deserialize the JSON body
    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.request(Method::GET, segments)?.send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// This method checks the status code and returns an appropriate error if
    /// the request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api(status.as_u16(), error_text));
        }

        Ok(())
    }
}
