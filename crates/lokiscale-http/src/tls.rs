//! Client TLS configuration.

use std::sync::Arc;

use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::warn;

use crate::error::{TransportError, TransportResult};

/// Pre-built `rustls` client configuration shared by all requests of a client.
#[derive(Clone)]
pub struct TlsConfig {
    pub client_config: Arc<rustls::ClientConfig>,
}

impl TlsConfig {
    /// Verify server certificates against the Mozilla root store.
    pub fn with_system_roots() -> TransportResult<Self> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::TlsConfig(format!("protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    /// Accept any server certificate chain and name.
    ///
    /// Only selected when a trigger sets `allowInsecureTLS`.
    pub fn insecure() -> TransportResult<Self> {
        warn!("tls certificate verification disabled");

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(SkipChainValidation::new(&provider));
        let config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::TlsConfig(format!("protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(Self {
            client_config: Arc::new(config),
        })
    }

    /// Pick the verifying or insecure configuration.
    pub fn for_insecure_flag(allow_insecure: bool) -> TransportResult<Self> {
        if allow_insecure {
            Self::insecure()
        } else {
            Self::with_system_roots()
        }
    }
}

/// Verifier behind `allowInsecureTLS`.
///
/// Skips chain and server-name validation, so self-signed and mismatched
/// certificates are accepted. Handshake signatures are still checked against
/// the presented certificate's key.
#[derive(Debug)]
struct SkipChainValidation {
    algorithms: WebPkiSupportedAlgorithms,
}

impl SkipChainValidation {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for SkipChainValidation {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
