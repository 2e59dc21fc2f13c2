//! Tracked File Store
//!
//! Handles database operations for job files applied from a repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_core::domain::tracked_file::TrackedFile;
use sqlx::SqlitePool;
use uuid::Uuid;
use uuid::fmt::Hyphenated;

use super::{StoreError, non_empty};

/// Persistence operations for tracked job files
#[async_trait]
pub trait TrackedFileStore: Send + Sync {
    /// Tracked files of a repository, ordered by path
    async fn list_by_repo(&self, repo_id: Uuid) -> Result<Vec<TrackedFile>, StoreError>;

    /// Creates or replaces the record for `(repo_id, path)`
    async fn upsert(
        &self,
        repo_id: Uuid,
        path: &str,
        commit: &str,
        job_id: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn delete(&self, repo_id: Uuid, path: &str) -> Result<(), StoreError>;

    async fn delete_by_repo(&self, repo_id: Uuid) -> Result<(), StoreError>;
}

/// SQLite implementation of [`TrackedFileStore`]
#[derive(Debug, Clone)]
pub struct SqlTrackedFileStore {
    pool: SqlitePool,
}

impl SqlTrackedFileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackedFileStore for SqlTrackedFileStore {
    async fn list_by_repo(&self, repo_id: Uuid) -> Result<Vec<TrackedFile>, StoreError> {
        let rows = sqlx::query_as::<_, TrackedFileRow>(
            r#"
            SELECT repo_id, path, last_commit, job_id, updated_at
            FROM repo_files
            WHERE repo_id = ?
            ORDER BY path ASC
            "#,
        )
        .bind(repo_id.hyphenated())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn upsert(
        &self,
        repo_id: Uuid,
        path: &str,
        commit: &str,
        job_id: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO repo_files (repo_id, path, last_commit, job_id, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(repo_id, path) DO UPDATE SET
                last_commit = excluded.last_commit,
                job_id = excluded.job_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(repo_id.hyphenated())
        .bind(path)
        .bind(non_empty(commit))
        .bind(job_id.and_then(non_empty))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, repo_id: Uuid, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM repo_files WHERE repo_id = ? AND path = ?")
            .bind(repo_id.hyphenated())
            .bind(path)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_by_repo(&self, repo_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM repo_files WHERE repo_id = ?")
            .bind(repo_id.hyphenated())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TrackedFileRow {
    repo_id: Hyphenated,
    path: String,
    last_commit: Option<String>,
    job_id: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<TrackedFileRow> for TrackedFile {
    fn from(row: TrackedFileRow) -> Self {
        TrackedFile {
            repo_id: row.repo_id.into_uuid(),
            path: row.path,
            last_commit: row.last_commit,
            job_id: row.job_id,
            updated_at: row.updated_at,
        }
    }
}
