//! Errors raised while talking to the Nomad API

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response
    #[error("Nomad request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Nomad answered with a non-success status
    #[error("Nomad returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A success response whose body did not have the expected shape
    #[error("unexpected Nomad response: {0}")]
    Decode(String),

    /// The address or job handed to the client cannot be used
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A job file Nomad refused to parse
    #[error("invalid job file {path}: {message}")]
    InvalidJob { path: String, message: String },
}

impl ClientError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether Nomad reported the resource as unknown
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Whether the failure lies with Nomad or the network rather than the request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
