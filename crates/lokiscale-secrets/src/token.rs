//! OAuth access tokens for the secret store's REST API.
//!
//! Two sources: the instance metadata server (ambient identity) and a
//! service-account key exchanged through an RS256-signed JWT bearer grant
//! (static secret). Tokens are cached until shortly before they expire.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use lokiscale_http::HttpClient;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CredentialError;

/// Token endpoint of the instance metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Service-account key JSON.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Parse a key JSON.
    pub fn from_json(json: &[u8]) -> Result<Self, CredentialError> {
        serde_json::from_slice(json)
            .map_err(|e| CredentialError::Config(format!("failed to get credentials from json: {e}")))
    }

    /// Signed JWT asserting this account, valid for one hour from `now`.
    fn assertion(&self, now: u64) -> Result<String, CredentialError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: u64,
            exp: u64,
        }

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| CredentialError::Config(format!("invalid service account private key: {e}")))?;

        let claims = Claims {
            iss: &self.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| CredentialError::Config(format!("failed to sign token assertion: {e}")))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Source {
    Metadata { url: String },
    ServiceAccount(ServiceAccountKey),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

struct CachedToken {
    token: String,
    expires_at: u64,
}

/// Fetches and caches bearer tokens.
pub struct TokenSource {
    source: Source,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Tokens from the metadata server at `url`.
    pub fn metadata(url: impl Into<String>) -> Self {
        Self::from_source(Source::Metadata { url: url.into() })
    }

    /// Tokens minted for a service account.
    pub fn service_account(key: ServiceAccountKey) -> Self {
        Self::from_source(Source::ServiceAccount(key))
    }

    fn from_source(source: Source) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// A valid access token, fetching a new one when the cache is stale.
    pub async fn token(
        &self,
        http: &HttpClient,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;
        let now = epoch_secs();

        if let Some(token) = cached.as_ref()
            && token.expires_at > now + EXPIRY_MARGIN_SECS
        {
            return Ok(token.token.clone());
        }

        let fresh = self.fetch(http, now, cancel).await?;
        debug!(expires_in = fresh.expires_in, "access token refreshed");
        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: now + fresh.expires_in,
        });
        Ok(fresh.access_token)
    }

    async fn fetch(
        &self,
        http: &HttpClient,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse, CredentialError> {
        let (endpoint, response) = match &self.source {
            Source::Metadata { url } => {
                let response = http
                    .get(url, &[("metadata-flavor", "Google".to_string())], cancel)
                    .await?;
                (url.as_str(), response)
            }
            Source::ServiceAccount(key) => {
                let assertion = key.assertion(now)?;
                let form = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", JWT_BEARER_GRANT)
                    .append_pair("assertion", &assertion)
                    .finish();
                let response = http
                    .post(&key.token_uri, "application/x-www-form-urlencoded", form, cancel)
                    .await?;
                (key.token_uri.as_str(), response)
            }
        };

        if !response.is_success() {
            return Err(CredentialError::Access {
                name: endpoint.to_string(),
                reason: format!("token request returned {}: {}", response.status, response.body_text()),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| CredentialError::Access {
            name: endpoint.to_string(),
            reason: format!("invalid token response: {e}"),
        })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
