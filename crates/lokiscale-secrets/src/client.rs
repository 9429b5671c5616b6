//! Secret-store client seam.
//!
//! The wire-level client sits behind [`SecretManagerClient`]; how one is
//! constructed for each identity provider sits behind [`ClientFactory`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::CredentialError;

/// Payload returned by an access call, prior to verification.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretPayload {
    pub data: Vec<u8>,
    /// CRC32C of `data` as computed by the store.
    pub data_crc32c: Option<i64>,
}

impl SecretPayload {
    /// Return the data if its CRC32C matches the store's checksum.
    ///
    /// A payload without a checksum cannot be verified and is rejected.
    pub fn verify(self, name: &str) -> Result<Vec<u8>, CredentialError> {
        let computed = checksum(&self.data);
        match self.data_crc32c {
            Some(expected) if expected == computed => Ok(self.data),
            expected => {
                error!(secret = %name, ?expected, computed, "secret payload checksum mismatch");
                Err(CredentialError::Corruption(name.to_string()))
            }
        }
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPayload")
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .field("data_crc32c", &self.data_crc32c)
            .finish()
    }
}

/// CRC32C (Castagnoli) of `data`, widened the way the store reports it.
pub fn checksum(data: &[u8]) -> i64 {
    i64::from(crc32c::crc32c(data))
}

/// Wire-level access to the secret store.
#[async_trait]
pub trait SecretManagerClient: Send + Sync {
    /// Fetch `projects/{project}/secrets/{id}/versions/{version}`.
    async fn access_secret_version(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<SecretPayload, CredentialError>;
}

/// Builds secret-store clients for each identity strategy.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Client authenticated with a service-account key JSON.
    async fn from_credentials_json(
        &self,
        json: &[u8],
    ) -> Result<Arc<dyn SecretManagerClient>, CredentialError>;

    /// Client authenticated by the execution environment.
    async fn ambient(&self) -> Result<Arc<dyn SecretManagerClient>, CredentialError>;
}
