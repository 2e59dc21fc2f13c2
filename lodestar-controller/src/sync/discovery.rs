//! Job file discovery inside a working copy

use lodestar_core::domain::snapshot::JobFile;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::SyncError;

/// File name suffixes recognised as job specifications
pub const JOB_FILE_SUFFIXES: [&str; 2] = [".nomad", ".nomad.hcl"];

pub fn is_job_file(name: &str) -> bool {
    JOB_FILE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Where to look for job files: relative paths live under the working copy
pub fn search_root(repo_root: &Path, job_path: &str) -> PathBuf {
    let job_path = Path::new(job_path);
    if job_path.is_absolute() {
        job_path.to_path_buf()
    } else {
        repo_root.join(job_path)
    }
}

/// Collects job files below `job_path`, sorted by their relative path
///
/// A missing search root yields no files. Paths are reported relative to the
/// working copy with `/` separators.
pub fn discover_job_files(repo_root: &Path, job_path: &str) -> Result<Vec<JobFile>, SyncError> {
    let root = search_root(repo_root, job_path);

    if !root.try_exists().map_err(|e| SyncError::io(&root, e))? {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| e.file_name() != OsStr::new(".git"))
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&root).to_path_buf();
            SyncError::io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_str().is_some_and(is_job_file) {
            continue;
        }

        let content = std::fs::read(entry.path()).map_err(|e| SyncError::io(entry.path(), e))?;
        files.push(JobFile {
            path: relative_path(repo_root, entry.path()),
            content,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn relative_path(repo_root: &Path, path: &Path) -> String {
    match path.strip_prefix(repo_root) {
        Ok(relative) => relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
