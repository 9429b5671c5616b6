//! Configuration error types.

use thiserror::Error;

/// Result type alias for metadata parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A missing or invalid configuration field.
///
/// Parsing stops at the first offending field, so an error always names
/// exactly one key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no {0} given")]
    Missing(&'static str),

    #[error("error parsing {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("incorrect value for authModes given: {0}")]
    UnsupportedAuthMode(String),

    #[error("metric target type {0} is not supported for external metrics")]
    UnsupportedMetricType(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// The configuration key this error refers to, if it names one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::Missing(field) => Some(*field),
            ConfigError::Invalid { field, .. } => Some(*field),
            ConfigError::UnsupportedAuthMode(_) => Some(crate::auth::AUTH_MODES),
            ConfigError::UnsupportedMetricType(_) => None,
        }
    }
}
