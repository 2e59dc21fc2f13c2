//! Credential Store
//!
//! Credentials are encrypted before they reach the database; plaintext only
//! exists transiently inside [`CredentialStore::decrypt_payload`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_core::domain::credential::{Credential, CredentialPayload, CredentialSummary};
use lodestar_core::dto::credential::CreateCredential;
use sqlx::SqlitePool;
use uuid::Uuid;
use uuid::fmt::Hyphenated;

use super::StoreError;
use crate::crypto::Encryptor;

/// Persistence operations for credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError>;

    /// Metadata of every credential, never the secret material
    async fn list(&self) -> Result<Vec<CredentialSummary>, StoreError>;

    async fn create(&self, input: CreateCredential) -> Result<Credential, StoreError>;

    /// Returns `false` when no credential had that id
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Decrypts the stored payload, checking it matches the recorded kind
    fn decrypt_payload(&self, credential: &Credential) -> Result<CredentialPayload, StoreError>;
}

/// SQLite implementation of [`CredentialStore`]
#[derive(Debug, Clone)]
pub struct SqlCredentialStore {
    pool: SqlitePool,
    encryptor: Encryptor,
}

impl SqlCredentialStore {
    pub fn new(pool: SqlitePool, encryptor: Encryptor) -> Self {
        Self { pool, encryptor }
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn get(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, name, type, data, created_at, updated_at
            FROM credentials
            WHERE id = ?
            "#,
        )
        .bind(id.hyphenated())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<CredentialSummary>, StoreError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, name, type, data, created_at, updated_at
            FROM credentials
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Credential::try_from(row).map(|c| CredentialSummary::from(&c)))
            .collect()
    }

    async fn create(&self, input: CreateCredential) -> Result<Credential, StoreError> {
        let now = Utc::now();
        let plaintext = serde_json::to_vec(&input.payload)?;

        let credential = Credential {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            kind: input.payload.kind(),
            data: self.encryptor.encrypt(&plaintext)?,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO credentials (id, name, type, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(credential.id.hyphenated())
        .bind(&credential.name)
        .bind(credential.kind.as_str())
        .bind(&credential.data)
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, &format!("credential {}", credential.name)))?;

        tracing::info!("Credential created: {} ({})", credential.name, credential.kind);

        Ok(credential)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id.hyphenated())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    fn decrypt_payload(&self, credential: &Credential) -> Result<CredentialPayload, StoreError> {
        let plaintext = self.encryptor.decrypt(&credential.data)?;
        let payload: CredentialPayload = serde_json::from_slice(&plaintext)?;

        if payload.kind() != credential.kind {
            return Err(StoreError::KindMismatch {
                id: credential.id,
                expected: credential.kind,
                found: payload.kind(),
            });
        }

        Ok(payload)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Hyphenated,
    name: String,
    #[sqlx(rename = "type")]
    kind: String,
    data: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        Ok(Credential {
            id: row.id.into_uuid(),
            name: row.name,
            kind: row.kind.parse()?,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use lodestar_core::domain::credential::CredentialKind;

    fn store(pool: SqlitePool) -> SqlCredentialStore {
        SqlCredentialStore::new(pool, Encryptor::from_hex(&"11".repeat(32)).unwrap())
    }

    fn token(name: &str) -> CreateCredential {
        CreateCredential {
            name: name.to_string(),
            payload: CredentialPayload::HttpsToken {
                username: None,
                token: "ghp_example".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_create_and_decrypt() {
        let store = store(test_pool().await);

        let created = store.create(token("github")).await.unwrap();
        assert_eq!(created.kind, CredentialKind::HttpsToken);
        assert!(!created.data.windows(11).any(|w| w == b"ghp_example"));

        let fetched = store.get(created.id).await.unwrap().unwrap();
        match store.decrypt_payload(&fetched).unwrap() {
            CredentialPayload::HttpsToken { username, token } => {
                assert!(username.is_none());
                assert_eq!(token, "ghp_example");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_hides_secrets_and_names_are_unique() {
        let store = store(test_pool().await);
        store.create(token("github")).await.unwrap();

        let duplicate = store.create(token("github")).await;
        assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "github");
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected() {
        let store = store(test_pool().await);
        let mut credential = store.create(token("github")).await.unwrap();
        credential.kind = CredentialKind::SshKey;

        assert!(matches!(
            store.decrypt_payload(&credential),
            Err(StoreError::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_stored_kind_is_an_error() {
        let pool = test_pool().await;
        let store = store(pool.clone());
        let credential = store.create(token("legacy")).await.unwrap();

        sqlx::query("UPDATE credentials SET type = 'basic' WHERE id = ?")
            .bind(credential.id.hyphenated())
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            store.get(credential.id).await,
            Err(StoreError::UnknownKind(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store(test_pool().await);
        let credential = store.create(token("github")).await.unwrap();

        assert!(store.delete(credential.id).await.unwrap());
        assert!(store.get(credential.id).await.unwrap().is_none());
        assert!(!store.delete(credential.id).await.unwrap());
    }
}
