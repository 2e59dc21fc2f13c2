//! Repository snapshot types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Point-in-time view of a repository produced by a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Local working copy the snapshot was taken from
    pub repo_path: PathBuf,
    pub commit_hash: String,
    /// `Name <email>`
    pub commit_author: String,
    /// First line of the commit message
    pub commit_title: String,
    pub job_files: Vec<JobFile>,
}

/// A job-spec file discovered in a repository
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    /// Path relative to the working copy root, `/` separated
    pub path: String,
    pub content: Vec<u8>,
}

impl std::fmt::Debug for JobFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFile")
            .field("path", &self.path)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// Returns the first line of a commit message
pub fn commit_title(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

/// Formats a commit author as `Name <email>`
pub fn commit_author(name: &str, email: &str) -> String {
    format!("{} <{}>", name, email)
}
