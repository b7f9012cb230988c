//! Credential error types.

use thiserror::Error;

/// Errors that can occur while acquiring or refreshing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// First acquisition failed; the manager cannot be constructed.
    #[error("Credential initialization failed: {0}")]
    Initialization(#[source] Box<CredentialError>),

    /// A refresh attempt failed; the previous token stays in place.
    #[error("Credential refresh failed: {0}")]
    Refresh(#[source] Box<CredentialError>),

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Token endpoint answered with a non-success status.
    #[error("Unexpected status code {status} from token endpoint: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Token endpoint answered without a usable token or expiry.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),

    /// Static credential material is missing or invalid.
    #[error("Invalid credential configuration: {0}")]
    Configuration(String),
}

impl CredentialError {
    /// Check if this error must abort service startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Initialization(_) | Self::Configuration(_))
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Refresh(inner) => inner.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn initialization(err: CredentialError) -> Self {
        Self::Initialization(Box::new(err))
    }

    pub(crate) fn refresh(err: CredentialError) -> Self {
        Self::Refresh(Box::new(err))
    }
}
