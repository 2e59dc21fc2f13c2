//! Repository Store
//!
//! Handles all database operations related to tracked git repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_core::domain::repository::Repository;
use lodestar_core::dto::repository::CreateRepository;
use sqlx::SqlitePool;
use uuid::Uuid;
use uuid::fmt::Hyphenated;

use super::{StoreError, non_empty};

/// Persistence operations for repositories
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// All repositories, oldest first
    async fn list(&self) -> Result<Vec<Repository>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Repository>, StoreError>;

    async fn create(&self, input: CreateRepository) -> Result<Repository, StoreError>;

    /// Returns `false` when no repository had that id
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Records the commit a reconciliation observed, along with the poll time
    async fn update_commit_metadata(
        &self,
        id: Uuid,
        commit: &str,
        author: &str,
        title: &str,
    ) -> Result<(), StoreError>;

    async fn update_poll_timestamp(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_by_credential(&self, credential_id: Uuid) -> Result<Vec<Repository>, StoreError>;

    /// Unlinks a credential from every repository referencing it
    async fn clear_credential(&self, credential_id: Uuid) -> Result<(), StoreError>;
}

/// SQLite implementation of [`RepositoryStore`]
#[derive(Debug, Clone)]
pub struct SqlRepositoryStore {
    pool: SqlitePool,
}

impl SqlRepositoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, repo_url, branch, job_path, credential_id,
           last_commit, last_commit_author, last_commit_title, last_polled_at,
           created_at, updated_at
    FROM repos
"#;

#[async_trait]
impl RepositoryStore for SqlRepositoryStore {
    async fn list(&self) -> Result<Vec<Repository>, StoreError> {
        let rows = sqlx::query_as::<_, RepositoryRow>(&format!(
            "{} ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Repository>, StoreError> {
        let row = sqlx::query_as::<_, RepositoryRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.hyphenated())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create(&self, input: CreateRepository) -> Result<Repository, StoreError> {
        let now = Utc::now();
        let job_path = input
            .job_path
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty());

        let repository = Repository {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            repo_url: input.repo_url.trim().to_string(),
            branch: input.branch.trim().to_string(),
            job_path,
            credential_id: input.credential_id,
            created_at: now,
            updated_at: now,
            last_commit: None,
            last_commit_author: None,
            last_commit_title: None,
            last_polled_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO repos (id, name, repo_url, branch, job_path, credential_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(repository.id.hyphenated())
        .bind(&repository.name)
        .bind(&repository.repo_url)
        .bind(&repository.branch)
        .bind(&repository.job_path)
        .bind(repository.credential_id.map(|id| id.hyphenated()))
        .bind(repository.created_at)
        .bind(repository.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(repository)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM repos WHERE id = ?")
            .bind(id.hyphenated())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_commit_metadata(
        &self,
        id: Uuid,
        commit: &str,
        author: &str,
        title: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE repos
            SET last_commit = ?, last_commit_author = ?, last_commit_title = ?,
                last_polled_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(non_empty(commit))
        .bind(non_empty(author))
        .bind(non_empty(title))
        .bind(now)
        .bind(now)
        .bind(id.hyphenated())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_poll_timestamp(&self, id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();

        sqlx::query("UPDATE repos SET last_polled_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id.hyphenated())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_by_credential(&self, credential_id: Uuid) -> Result<Vec<Repository>, StoreError> {
        let rows = sqlx::query_as::<_, RepositoryRow>(&format!(
            "{} WHERE credential_id = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(credential_id.hyphenated())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn clear_credential(&self, credential_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE repos SET credential_id = NULL, updated_at = ? WHERE credential_id = ?",
        )
        .bind(Utc::now())
        .bind(credential_id.hyphenated())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: Hyphenated,
    name: String,
    repo_url: String,
    branch: String,
    job_path: Option<String>,
    credential_id: Option<Hyphenated>,
    last_commit: Option<String>,
    last_commit_author: Option<String>,
    last_commit_title: Option<String>,
    last_polled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RepositoryRow> for Repository {
    fn from(row: RepositoryRow) -> Self {
        Repository {
            id: row.id.into_uuid(),
            name: row.name,
            repo_url: row.repo_url,
            branch: row.branch,
            job_path: row.job_path,
            credential_id: row.credential_id.map(Hyphenated::into_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_commit: row.last_commit,
            last_commit_author: row.last_commit_author,
            last_commit_title: row.last_commit_title,
            last_polled_at: row.last_polled_at,
        }
    }
}
