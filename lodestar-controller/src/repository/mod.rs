//! Repository Module
//!
//! Data access layer for the controller.
//! Each store handles database operations for a single entity and is exposed
//! as a trait so the reconciler can be tested against any backend.

mod credential;
mod repo;
mod tracked_file;

use lodestar_core::domain::credential::{CredentialKind, UnknownCredentialKind};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{CryptoError, Encryptor};

// Re-export traits
pub use credential::CredentialStore;
pub use repo::RepositoryStore;
pub use tracked_file::TrackedFileStore;

// Re-export implementations
pub use credential::SqlCredentialStore;
pub use repo::SqlRepositoryStore;
pub use tracked_file::SqlTrackedFileStore;

/// Errors raised by the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    UnknownKind(#[from] UnknownCredentialKind),

    #[error("credential payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("credential {id} is recorded as {expected} but holds a {found} payload")]
    KindMismatch {
        id: Uuid,
        expected: CredentialKind,
        found: CredentialKind,
    },

    #[error("{0}")]
    Conflict(String),
}

impl StoreError {
    /// Maps unique-constraint violations to [`StoreError::Conflict`]
    fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("{} already exists", what))
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Stores `None` for blank strings so that "not recorded" stays unambiguous
fn non_empty(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

/// The three stores the controller works with, behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub repos: Arc<dyn RepositoryStore>,
    pub files: Arc<dyn TrackedFileStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Stores {
    /// SQLite-backed stores sharing one pool
    pub fn sqlite(pool: SqlitePool, encryptor: Encryptor) -> Self {
        Self {
            repos: Arc::new(SqlRepositoryStore::new(pool.clone())),
            files: Arc::new(SqlTrackedFileStore::new(pool.clone())),
            credentials: Arc::new(SqlCredentialStore::new(pool, encryptor)),
        }
    }
}
