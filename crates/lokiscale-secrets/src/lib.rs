//! lokiscale-secrets — credential resolution for the secret store.
//!
//! A [`SecretManagerHandler`] owns one secret-store client for the lifetime
//! of its scaler. The client is built lazily, exactly once, according to
//! the configured identity provider:
//!
//! ```text
//! identity provider        credential material           project id
//! ───────────────────────  ────────────────────────────  ─────────────────────
//! "" / "none"  StaticSecret   service-account JSON read     `project_id` field of
//!                             from a namespaced secret      that JSON
//! "gcp"        AmbientIdentity  none (environment supplies)  configured up front
//! anything else            UnsupportedProvider
//! ```
//!
//! Every read is verified: the CRC32C (Castagnoli) of the returned payload
//! must equal the checksum the store sent with it, otherwise the payload is
//! discarded and [`CredentialError::Corruption`] is returned.

pub mod client;
pub mod error;
pub mod handler;
pub mod lookup;
pub mod provider;
pub mod rest;
pub mod token;

pub use client::{ClientFactory, SecretManagerClient, SecretPayload};
pub use error::{CredentialError, CredentialResult};
pub use handler::{resolve_auth_params, resource_name, Credential, SecretManagerHandler};
pub use lookup::{DirSecretLookup, MemorySecretLookup, SecretLookup};
pub use provider::{IdentityProvider, ProviderKind, SecretKeyRef, SecretManagerSpec, SecretTarget};
pub use rest::{RestClientFactory, RestSecretManager};
pub use token::{ServiceAccountKey, TokenSource};
