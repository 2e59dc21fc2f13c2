//! Job document types
//!
//! A [`JobDocument`] is the structured form of a job specification. Only the
//! fields the controller reads or writes are typed; everything else the parser
//! produced is carried through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the source repository URL
pub const META_REPO_URL: &str = "lodestar/repo-url";
/// Metadata key holding the source repository name
pub const META_REPO_NAME: &str = "lodestar/repo-name";
/// Metadata key holding the job file path inside the repository
pub const META_JOB_FILE: &str = "lodestar/job-file";
/// Metadata key holding the applied commit hash
pub const META_COMMIT: &str = "lodestar/commit";
/// Metadata key holding the applied commit author
pub const META_COMMIT_AUTHOR: &str = "lodestar/commit-author";
/// Metadata key holding the applied commit title
pub const META_COMMIT_TITLE: &str = "lodestar/commit-title";

/// Prefix shared by every provenance metadata key
pub const META_PREFIX: &str = "lodestar/";

/// Structured job specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "Meta", default, deserialize_with = "nullable_meta")]
    pub meta: BTreeMap<String, String>,

    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl JobDocument {
    /// Effective job identifier: the explicit ID if set, else the name
    pub fn job_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.name.as_deref().filter(|name| !name.is_empty()))
    }

    /// Records where this job came from in its metadata map
    pub fn inject_provenance(&mut self, provenance: &Provenance<'_>) {
        let entries = [
            (META_REPO_URL, provenance.repo_url),
            (META_REPO_NAME, provenance.repo_name),
            (META_JOB_FILE, provenance.job_file),
            (META_COMMIT, provenance.commit),
            (META_COMMIT_AUTHOR, provenance.commit_author),
            (META_COMMIT_TITLE, provenance.commit_title),
        ];
        for (key, value) in entries {
            self.meta.insert(key.to_string(), value.to_string());
        }
    }
}

fn nullable_meta<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Origin of a job document, injected as metadata on every registration
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub repo_url: &'a str,
    pub repo_name: &'a str,
    pub job_file: &'a str,
    pub commit: &'a str,
    pub commit_author: &'a str,
    pub commit_title: &'a str,
}

/// Raw source submitted alongside a job for cluster-side history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub source: String,
    pub format: String,
}
