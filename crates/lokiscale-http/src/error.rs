//! Transport error types.

use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A request that never produced a complete HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request uri: {0}")]
    InvalidUri(String),

    #[error("connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("tls handshake with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("tls configuration error: {0}")]
    TlsConfig(String),

    #[error("http exchange failed: {0}")]
    Http(String),

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether the request was aborted by the caller's cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}
