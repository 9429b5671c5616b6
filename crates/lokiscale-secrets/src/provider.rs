//! Identity provider configuration and resolution.

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// Identity provider token selecting static credentials.
pub const PROVIDER_NONE: &str = "none";
/// Identity provider token selecting ambient workload identity.
pub const PROVIDER_GCP: &str = "gcp";

/// Reference to one key of a namespaced key/value secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// A secret to read and the auth parameter it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretTarget {
    pub parameter: String,
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "latest".to_string()
}

/// Raw secret-store configuration as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretManagerSpec {
    /// `""`/`"none"` for static credentials, `"gcp"` for ambient identity.
    #[serde(default)]
    pub identity_provider: Option<String>,
    /// Required for ambient identity; ignored otherwise.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Service-account key location for static credentials.
    #[serde(default)]
    pub credentials: Option<SecretKeyRef>,
    #[serde(default)]
    pub secrets: Vec<SecretTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderKind {
    StaticSecret,
    AmbientIdentity,
}

/// Resolved identity strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityProvider {
    /// Credentials come from a namespaced secret holding a key JSON.
    StaticSecret(SecretKeyRef),
    /// Credentials come from the execution environment.
    AmbientIdentity { project_id: String },
}

impl IdentityProvider {
    /// Resolve the configured provider token into a strategy.
    pub fn resolve(spec: &SecretManagerSpec) -> Result<Self, CredentialError> {
        match spec.identity_provider.as_deref().map(str::trim).unwrap_or("") {
            "" | PROVIDER_NONE => spec
                .credentials
                .clone()
                .map(IdentityProvider::StaticSecret)
                .ok_or_else(|| CredentialError::MissingCredential("no credentials configured".into())),
            PROVIDER_GCP => match spec.project_id.as_deref() {
                Some(id) if !id.is_empty() => Ok(IdentityProvider::AmbientIdentity {
                    project_id: id.to_string(),
                }),
                _ => Err(CredentialError::Config(
                    "project id needs to be provided when using the gcp identity provider".into(),
                )),
            },
            other => Err(CredentialError::UnsupportedProvider(other.to_string())),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            IdentityProvider::StaticSecret(_) => ProviderKind::StaticSecret,
            IdentityProvider::AmbientIdentity { .. } => ProviderKind::AmbientIdentity,
        }
    }
}
