//! Transport authentication for git remotes

use git2::{Cred, CredentialType, RemoteCallbacks};
use lodestar_core::domain::credential::CredentialPayload;
use std::fmt;

use super::SyncError;

const DEFAULT_TOKEN_USERNAME: &str = "token";
const DEFAULT_SSH_USERNAME: &str = "git";

/// Authentication method for a single sync
#[derive(Clone, Default)]
pub enum GitAuth {
    #[default]
    Anonymous,
    Token {
        username: String,
        token: String,
    },
    SshKey {
        private_key: String,
        passphrase: Option<String>,
    },
}

impl GitAuth {
    /// Builds the auth method for a decrypted credential payload
    ///
    /// Key material is only screened here: a key that does not look like a
    /// private key, or a PEM key marked encrypted without a passphrase, is
    /// rejected. libgit2 parses the key itself when the remote asks for it.
    pub fn from_payload(payload: Option<&CredentialPayload>) -> Result<Self, SyncError> {
        match payload {
            None => Ok(GitAuth::Anonymous),
            Some(CredentialPayload::HttpsToken { username, token }) => {
                if token.is_empty() {
                    return Err(SyncError::InvalidCredential("token is empty".to_string()));
                }
                Ok(GitAuth::Token {
                    username: username
                        .as_deref()
                        .filter(|u| !u.is_empty())
                        .unwrap_or(DEFAULT_TOKEN_USERNAME)
                        .to_string(),
                    token: token.clone(),
                })
            }
            Some(CredentialPayload::SshKey {
                private_key,
                passphrase,
            }) => {
                let passphrase = passphrase.clone().filter(|p| !p.is_empty());
                check_private_key(private_key, passphrase.is_some())?;
                Ok(GitAuth::SshKey {
                    private_key: private_key.clone(),
                    passphrase,
                })
            }
        }
    }

    /// Remote callbacks answering credential requests with this method
    ///
    /// Credentials are offered once; a second request means the remote
    /// rejected them.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if matches!(self, GitAuth::Anonymous) {
            return callbacks;
        }

        let mut offered = false;
        callbacks.credentials(move |_url, username_from_url, allowed| {
            let ssh_user = username_from_url.unwrap_or(DEFAULT_SSH_USERNAME);

            if allowed.contains(CredentialType::USERNAME) {
                return Cred::username(ssh_user);
            }
            if offered {
                return Err(git2::Error::from_str("remote rejected the configured credential"));
            }
            offered = true;

            match self {
                GitAuth::Token { username, token } => Cred::userpass_plaintext(username, token),
                GitAuth::SshKey {
                    private_key,
                    passphrase,
                } => Cred::ssh_key_from_memory(ssh_user, None, private_key, passphrase.as_deref()),
                GitAuth::Anonymous => Cred::default(),
            }
        });
        callbacks
    }
}

/// Rejects text without a private key armor line, and PEM keys whose headers
/// mark them encrypted when no passphrase is configured
fn check_private_key(private_key: &str, has_passphrase: bool) -> Result<(), SyncError> {
    let key = private_key.trim();
    let armored = key
        .lines()
        .next()
        .is_some_and(|line| line.starts_with("-----BEGIN ") && line.ends_with("PRIVATE KEY-----"));
    if !armored {
        return Err(SyncError::InvalidCredential(
            "ssh key does not look like a private key".to_string(),
        ));
    }

    let encrypted =
        key.contains("BEGIN ENCRYPTED PRIVATE KEY") || key.contains("Proc-Type: 4,ENCRYPTED");
    if encrypted && !has_passphrase {
        return Err(SyncError::InvalidCredential(
            "ssh private key is encrypted but no passphrase is set".to_string(),
        ));
    }

    Ok(())
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitAuth::Anonymous => f.write_str("Anonymous"),
            GitAuth::Token { username, .. } => f
                .debug_struct("Token")
                .field("username", username)
                .finish_non_exhaustive(),
            GitAuth::SshKey { .. } => f.debug_struct("SshKey").finish_non_exhaustive(),
        }
    }
}
