//! Credential resolution handler.
//!
//! Holds the secret-store client of one scaler. The client is created on
//! first use behind a [`OnceCell`], so concurrent first reads build it
//! exactly once; a failed initialization is not cached and the next call
//! tries again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, SecretManagerClient};
use crate::error::{CredentialError, CredentialResult};
use crate::lookup::SecretLookup;
use crate::provider::{IdentityProvider, ProviderKind, SecretKeyRef, SecretManagerSpec};

/// An initialized secret-store identity.
pub struct Credential {
    pub kind: ProviderKind,
    pub project_id: String,
    pub client: Arc<dyn SecretManagerClient>,
    /// Where the static credentials came from; `None` for ambient identity.
    pub secret_ref: Option<SecretKeyRef>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("project_id", &self.project_id)
            .field("secret_ref", &self.secret_ref)
            .finish_non_exhaustive()
    }
}

/// The part of a service-account key JSON this handler needs.
#[derive(Deserialize)]
struct ProjectId {
    #[serde(default)]
    project_id: String,
}

/// Owns the secret-store identity of one scaler.
pub struct SecretManagerHandler {
    spec: SecretManagerSpec,
    namespace: String,
    lookup: Arc<dyn SecretLookup>,
    factory: Arc<dyn ClientFactory>,
    credential: OnceCell<Credential>,
}

impl SecretManagerHandler {
    pub fn new(
        spec: SecretManagerSpec,
        namespace: impl Into<String>,
        lookup: Arc<dyn SecretLookup>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            spec,
            namespace: namespace.into(),
            lookup,
            factory,
            credential: OnceCell::new(),
        }
    }

    /// Whether the client has been built.
    pub fn is_initialized(&self) -> bool {
        self.credential.initialized()
    }

    /// Resolve the identity provider and build the client, once.
    pub async fn initialize(&self) -> Result<&Credential, CredentialError> {
        self.credential
            .get_or_try_init(|| self.build_credential())
            .await
            .inspect_err(|e| warn!(namespace = %self.namespace, error = %e, "secret manager initialization failed"))
    }

    async fn build_credential(&self) -> Result<Credential, CredentialError> {
        let provider = IdentityProvider::resolve(&self.spec)?;
        let kind = provider.kind();

        let credential = match provider {
            IdentityProvider::StaticSecret(secret_ref) => {
                let raw = self
                    .lookup
                    .lookup(&self.namespace, &secret_ref.name, &secret_ref.key)
                    .await
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        CredentialError::MissingCredential(format!(
                            "secret {}/{} has no key {}",
                            self.namespace, secret_ref.name, secret_ref.key
                        ))
                    })?;

                let project: ProjectId = serde_json::from_str(&raw)
                    .map_err(|e| CredentialError::Config(format!("failed to parse json key: {e}")))?;
                if project.project_id.is_empty() {
                    return Err(CredentialError::Config("json key has no project_id".into()));
                }

                let client = self.factory.from_credentials_json(raw.as_bytes()).await?;
                Credential {
                    kind,
                    project_id: project.project_id,
                    client,
                    secret_ref: Some(secret_ref),
                }
            }
            IdentityProvider::AmbientIdentity { project_id } => Credential {
                kind,
                project_id,
                client: self.factory.ambient().await?,
                secret_ref: None,
            },
        };

        info!(
            namespace = %self.namespace,
            kind = ?credential.kind,
            project = %credential.project_id,
            "secret manager client initialized"
        );
        Ok(credential)
    }

    /// Read and verify one secret version.
    ///
    /// Initializes the client first if needed.
    pub async fn read(
        &self,
        secret_id: &str,
        secret_version: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, CredentialError> {
        let credential = self.initialize().await?;
        let name = resource_name(&credential.project_id, secret_id, secret_version);

        let payload = credential
            .client
            .access_secret_version(&name, cancel)
            .await
            .inspect_err(|e| warn!(secret = %name, error = %e, "failed to access the secret"))?;

        let data = payload.verify(&name)?;
        debug!(secret = %name, bytes = data.len(), "secret read");
        Ok(data)
    }

    /// [`read`](Self::read) decoded as UTF-8.
    pub async fn read_string(
        &self,
        secret_id: &str,
        secret_version: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let data = self.read(secret_id, secret_version, cancel).await?;
        String::from_utf8(data)
            .map_err(|_| CredentialError::Config(format!("secret {secret_id} is not valid UTF-8")))
    }
}

/// `projects/{project}/secrets/{id}/versions/{version}`.
pub fn resource_name(project_id: &str, secret_id: &str, version: &str) -> String {
    format!("projects/{project_id}/secrets/{secret_id}/versions/{version}")
}

/// Read every configured secret target into an auth-parameter map.
pub async fn resolve_auth_params(
    handler: &SecretManagerHandler,
    cancel: &CancellationToken,
) -> CredentialResult<HashMap<String, String>> {
    let mut params = HashMap::with_capacity(handler.spec.secrets.len());
    for target in &handler.spec.secrets {
        let value = handler
            .read_string(&target.id, &target.version, cancel)
            .await?;
        params.insert(target.parameter.clone(), value);
    }
    Ok(params)
}
