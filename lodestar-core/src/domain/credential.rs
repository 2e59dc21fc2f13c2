//! Credential domain types
//!
//! Credentials are stored encrypted. The controller only ever sees a
//! [`CredentialPayload`] at the moment it authenticates a git transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Stored credential record; `data` holds the encrypted payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: Uuid,
    pub name: String,
    pub kind: CredentialKind,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential listing entry, never carries key material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub id: Uuid,
    pub name: String,
    pub kind: CredentialKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Credential> for CredentialSummary {
    fn from(credential: &Credential) -> Self {
        Self {
            id: credential.id,
            name: credential.name.clone(),
            kind: credential.kind,
            created_at: credential.created_at,
            updated_at: credential.updated_at,
        }
    }
}

/// Supported transport authentication kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    HttpsToken,
    SshKey,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::HttpsToken => "https-token",
            CredentialKind::SshKey => "ssh-key",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored kind tag is not one of the supported variants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported credential type: {0}")]
pub struct UnknownCredentialKind(pub String);

impl FromStr for CredentialKind {
    type Err = UnknownCredentialKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "https-token" => Ok(CredentialKind::HttpsToken),
            "ssh-key" => Ok(CredentialKind::SshKey),
            other => Err(UnknownCredentialKind(other.to_string())),
        }
    }
}

/// Decrypted authentication material
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CredentialPayload {
    HttpsToken {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        token: String,
    },
    SshKey {
        private_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
}

impl CredentialPayload {
    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialPayload::HttpsToken { .. } => CredentialKind::HttpsToken,
            CredentialPayload::SshKey { .. } => CredentialKind::SshKey,
        }
    }
}

// Key material must never end up in logs.
impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialPayload::HttpsToken { username, .. } => f
                .debug_struct("HttpsToken")
                .field("username", username)
                .field("token", &"<redacted>")
                .finish(),
            CredentialPayload::SshKey { passphrase, .. } => f
                .debug_struct("SshKey")
                .field("private_key", &"<redacted>")
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [CredentialKind::HttpsToken, CredentialKind::SshKey] {
            assert_eq!(kind.as_str().parse::<CredentialKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "basic-auth".parse::<CredentialKind>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported credential type: basic-auth");
    }

    #[test]
    fn test_payload_is_tagged() {
        let payload = CredentialPayload::HttpsToken {
            username: None,
            token: "s3cret".to_string(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "https-token");
        assert_eq!(json["token"], "s3cret");
        assert!(json.get("username").is_none());

        let parsed: CredentialPayload = serde_json::from_value(serde_json::json!({
            "type": "ssh-key",
            "private_key": "KEY",
        }))
        .unwrap();
        assert_eq!(parsed.kind(), CredentialKind::SshKey);
    }

    #[test]
    fn test_unknown_payload_variant_fails_to_decode() {
        let result: Result<CredentialPayload, _> = serde_json::from_value(serde_json::json!({
            "type": "kerberos",
            "ticket": "x",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let payload = CredentialPayload::SshKey {
            private_key: "-----BEGIN KEY-----".to_string(),
            passphrase: Some("hunter2".to_string()),
        };
        let rendered = format!("{:?}", payload);
        assert!(!rendered.contains("BEGIN KEY"));
        assert!(!rendered.contains("hunter2"));
    }
}
