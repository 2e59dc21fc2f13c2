use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Credentials table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            type TEXT NOT NULL,
            data BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Repositories table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repos (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            repo_url TEXT NOT NULL,
            branch TEXT NOT NULL,
            job_path TEXT,
            credential_id TEXT,
            last_commit TEXT,
            last_commit_author TEXT,
            last_commit_title TEXT,
            last_polled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tracked job files
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS repo_files (
            repo_id TEXT NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            last_commit TEXT,
            job_id TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE(repo_id, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_repos_credential_id ON repos(credential_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Directory that must exist before a file-backed database can be created
pub fn database_dir(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or_default();

    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }

    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// In-memory database with the schema applied, for store and manager tests
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_dir() {
        assert_eq!(
            database_dir("sqlite://data/lodestar.sqlite?mode=rwc"),
            Some(PathBuf::from("data"))
        );
        assert_eq!(
            database_dir("sqlite:///var/lib/lodestar/db.sqlite"),
            Some(PathBuf::from("/var/lib/lodestar"))
        );
        assert_eq!(database_dir("sqlite://lodestar.sqlite"), None);
        assert_eq!(database_dir("sqlite::memory:"), None);
        assert_eq!(database_dir("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|(name,)| name.as_str()).collect();
        assert!(names.contains(&"credentials"));
        assert!(names.contains(&"repos"));
        assert!(names.contains(&"repo_files"));
    }
}
