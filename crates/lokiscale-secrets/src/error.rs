//! Credential error types.

use lokiscale_http::TransportError;
use thiserror::Error;

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Errors from initializing the secret-store client or reading a secret.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The static-secret provider's credentials could not be found.
    #[error("credentials secret is expected when not using an identity provider: {0}")]
    MissingCredential(String),

    #[error("invalid credential configuration: {0}")]
    Config(String),

    #[error("secret manager does not support identity provider {0:?}")]
    UnsupportedProvider(String),

    #[error("secret payload data corruption detected for {0}")]
    Corruption(String),

    #[error("failed to access {name}: {reason}")]
    Access { name: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}
