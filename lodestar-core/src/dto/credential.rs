//! Credential DTOs

use serde::{Deserialize, Serialize};

use crate::domain::credential::CredentialPayload;

/// Request to store a new credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredential {
    pub name: String,
    pub payload: CredentialPayload,
}

impl CreateCredential {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        match &self.payload {
            CredentialPayload::HttpsToken { token, .. } if token.is_empty() => {
                Err("token is required".to_string())
            }
            CredentialPayload::SshKey { private_key, .. } if private_key.trim().is_empty() => {
                Err("private_key is required".to_string())
            }
            _ => Ok(()),
        }
    }
}
