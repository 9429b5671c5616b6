//! Query error types.

use lokiscale_http::TransportError;
use thiserror::Error;

/// Errors from a single query attempt.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Connection, TLS, or cancellation failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("query api returned error. status: {status} response: {body}")]
    Response { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("metric {metric} target may be lost, the {what} is empty")]
    NullData { metric: String, what: &'static str },

    #[error("query {query} didn't return enough values")]
    InsufficientValues { query: String },

    #[error("query {query} returned {count} series, expected at most one")]
    Cardinality { query: String, count: usize },
}

impl QueryError {
    /// Whether the attempt was aborted by the caller's cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Transport(e) if e.is_cancelled())
    }
}
