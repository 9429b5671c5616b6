//! Scaler error types.

use lokiscale_core::ConfigError;
use lokiscale_query::QueryError;
use lokiscale_secrets::CredentialError;
use thiserror::Error;

/// Result type alias for scaler operations.
pub type ScalerResult<T> = Result<T, ScalerError>;

/// Anything that can fail while building or polling a scaler.
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("error parsing loki metadata: {0}")]
    Config(#[from] ConfigError),

    #[error("error executing loki query: {0}")]
    Query(#[from] QueryError),

    #[error("error resolving credentials: {0}")]
    Credential(#[from] CredentialError),
}

impl ScalerError {
    /// Whether the poll was aborted by the caller.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ScalerError::Query(e) => e.is_cancelled(),
            ScalerError::Credential(CredentialError::Transport(e)) => e.is_cancelled(),
            _ => false,
        }
    }
}
