//! REST client for the secret store.
//!
//! `GET {endpoint}/v1/{name}:access` with a bearer token; the response
//! carries base64 payload data and its CRC32C as a decimal int64.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lokiscale_http::HttpClient;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientFactory, SecretManagerClient, SecretPayload};
use crate::error::CredentialError;
use crate::token::{ServiceAccountKey, TokenSource, METADATA_TOKEN_URL};

/// Public secret store endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://secretmanager.googleapis.com";

#[derive(Deserialize)]
struct AccessResponse {
    #[serde(default)]
    payload: Option<PayloadJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadJson {
    #[serde(default)]
    data: String,
    #[serde(default)]
    data_crc32c: Option<Crc32c>,
}

/// int64 fields are encoded as JSON strings; accept plain numbers as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum Crc32c {
    Text(String),
    Number(i64),
}

impl Crc32c {
    fn value(&self) -> Option<i64> {
        match self {
            Crc32c::Text(s) => s.parse().ok(),
            Crc32c::Number(n) => Some(*n),
        }
    }
}

/// Secret store client speaking the REST API.
pub struct RestSecretManager {
    http: HttpClient,
    endpoint: String,
    tokens: TokenSource,
}

impl RestSecretManager {
    pub fn new(http: HttpClient, endpoint: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl SecretManagerClient for RestSecretManager {
    async fn access_secret_version(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<SecretPayload, CredentialError> {
        let token = self.tokens.token(&self.http, cancel).await?;
        let url = format!("{}/v1/{name}:access", self.endpoint);

        let response = self
            .http
            .get(&url, &[("authorization", format!("Bearer {token}"))], cancel)
            .await?;

        if !response.is_success() {
            return Err(CredentialError::Access {
                name: name.to_string(),
                reason: format!("status {}: {}", response.status, response.body_text()),
            });
        }

        let access: AccessResponse =
            serde_json::from_slice(&response.body).map_err(|e| CredentialError::Access {
                name: name.to_string(),
                reason: format!("invalid response: {e}"),
            })?;
        let payload = access.payload.ok_or_else(|| CredentialError::Access {
            name: name.to_string(),
            reason: "response has no payload".into(),
        })?;

        let data = STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|e| CredentialError::Access {
                name: name.to_string(),
                reason: format!("payload is not base64: {e}"),
            })?;

        debug!(secret = %name, bytes = data.len(), "secret version accessed");
        Ok(SecretPayload {
            data,
            data_crc32c: payload.data_crc32c.as_ref().and_then(Crc32c::value),
        })
    }
}

/// Builds [`RestSecretManager`] clients for both identity strategies.
#[derive(Debug, Clone)]
pub struct RestClientFactory {
    endpoint: String,
    metadata_token_url: String,
    allow_insecure_tls: bool,
}

impl Default for RestClientFactory {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
            allow_insecure_tls: false,
        }
    }
}

impl RestClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the secret store endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the metadata server token URL used for ambient identity.
    pub fn with_metadata_token_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_token_url = url.into();
        self
    }

    /// Skip certificate checks when talking to the store and token endpoints.
    pub fn with_insecure_tls(mut self, allow: bool) -> Self {
        self.allow_insecure_tls = allow;
        self
    }

    pub fn allows_insecure_tls(&self) -> bool {
        self.allow_insecure_tls
    }

    fn build(&self, tokens: TokenSource) -> Result<Arc<dyn SecretManagerClient>, CredentialError> {
        let http = HttpClient::new(self.allow_insecure_tls)?;
        Ok(Arc::new(RestSecretManager::new(http, self.endpoint.clone(), tokens)))
    }
}

#[async_trait]
impl ClientFactory for RestClientFactory {
    async fn from_credentials_json(
        &self,
        json: &[u8],
    ) -> Result<Arc<dyn SecretManagerClient>, CredentialError> {
        let key = ServiceAccountKey::from_json(json)?;
        self.build(TokenSource::service_account(key))
    }

    async fn ambient(&self) -> Result<Arc<dyn SecretManagerClient>, CredentialError> {
        self.build(TokenSource::metadata(self.metadata_token_url.clone()))
    }
}
