//! Mutual-TLS settings built from in-memory PEM material.
//!
//! The PEM content is validated up front with rustls so that a broken
//! certificate, key or CA is reported while the registry is being built,
//! not on the first command.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::ConnectionConfig;
use crate::error::{RegistryError, RegistryResult};

/// TLS protocol versions this crate negotiates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// Lowest protocol version accepted on any connection
pub const MIN_TLS_VERSION: TlsVersion = TlsVersion::Tls12;

/// How the peer certificate exchange is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
    /// Both sides present certificates and both are verified
    RequireAndVerify,
}

/// Validated mutual-TLS material for one connection
#[derive(Clone)]
pub struct TlsSettings {
    ca_cert: Vec<u8>,
    client_cert: Vec<u8>,
    client_key: Vec<u8>,
    root_certificates: usize,
    client_config: Arc<ClientConfig>,
}

impl TlsSettings {
    /// Settings for `config`, or `None` unless all three TLS fields are set.
    pub fn from_config(config: &ConnectionConfig) -> RegistryResult<Option<Self>> {
        if !config.has_tls() {
            return Ok(None);
        }

        Self::from_pem(&config.ca_cert, &config.cert_file, &config.cert_key).map(Some)
    }

    /// Parse the client key pair and the CA, then assemble a rustls client
    /// config that presents the client certificate and accepts TLS 1.2+.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidKeyPair`] if the certificate or key is
    ///   missing, malformed, or the two do not form a usable pair
    /// - [`RegistryError::InvalidCaCertificate`] if the CA content holds no
    ///   usable certificate
    pub fn from_pem(ca_cert: &str, client_cert: &str, client_key: &str) -> RegistryResult<Self> {
        let certs = parse_certificates(client_cert)
            .map_err(|e| RegistryError::InvalidKeyPair(format!("client certificate: {}", e)))?;
        if certs.is_empty() {
            return Err(RegistryError::InvalidKeyPair(
                "no certificate found in client certificate PEM".to_string(),
            ));
        }
        let key = parse_private_key(client_key)?;

        let mut roots = RootCertStore::empty();
        let ca_certs = parse_certificates(ca_cert)
            .map_err(|e| RegistryError::InvalidCaCertificate(e.to_string()))?;
        let (added, ignored) = roots.add_parsable_certificates(ca_certs);
        if added == 0 {
            return Err(RegistryError::InvalidCaCertificate(format!(
                "no usable certificate in CA PEM ({} rejected)",
                ignored
            )));
        }

        let client_config = ClientConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| RegistryError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| RegistryError::InvalidKeyPair(e.to_string()))?;

        Ok(Self {
            ca_cert: ca_cert.as_bytes().to_vec(),
            client_cert: client_cert.as_bytes().to_vec(),
            client_key: client_key.as_bytes().to_vec(),
            root_certificates: added,
            client_config: Arc::new(client_config),
        })
    }

    /// Policy the validated config was built with. Connections built from
    /// [`certificates`](Self::certificates) by the redis client follow the
    /// same floor, rustls negotiating nothing below TLS 1.2.
    pub fn min_version(&self) -> TlsVersion {
        MIN_TLS_VERSION
    }

    pub fn client_auth(&self) -> ClientAuth {
        ClientAuth::RequireAndVerify
    }

    /// Number of CA certificates in the trust pool
    pub fn root_certificate_count(&self) -> usize {
        self.root_certificates
    }

    /// The rustls config assembled while validating the material.
    ///
    /// Redis connections do not use it: the redis client builds its own
    /// rustls config from [`certificates`](Self::certificates). It is kept
    /// for callers that open their own TLS streams to the same server.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Certificate material in the form the redis client consumes
    pub fn certificates(&self) -> redis::TlsCertificates {
        redis::TlsCertificates {
            client_tls: Some(redis::ClientTlsConfig {
                client_cert: self.client_cert.clone(),
                client_key: self.client_key.clone(),
            }),
            root_cert: Some(self.ca_cert.clone()),
        }
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("min_version", &self.min_version())
            .field("client_auth", &self.client_auth())
            .field("root_certificates", &self.root_certificates)
            .field("client_key", &"<redacted>")
            .finish()
    }
}

fn parse_certificates(pem: &str) -> std::io::Result<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(&mut Cursor::new(pem.as_bytes())).collect()
}

fn parse_private_key(pem: &str) -> RegistryResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut Cursor::new(pem.as_bytes()))
        .map_err(|e| RegistryError::InvalidKeyPair(format!("client key: {}", e)))?
        .ok_or_else(|| RegistryError::InvalidKeyPair("no private key found in client key PEM".to_string()))
}

/// Process-wide rustls provider, installing ring when none is set.
///
/// The redis client builds its own rustls config from the raw PEM and
/// relies on the process default, so it must exist before connecting.
fn crypto_provider() -> Arc<CryptoProvider> {
    if let Some(provider) = CryptoProvider::get_default() {
        return provider.clone();
    }

    let _ = rustls::crypto::ring::default_provider().install_default();
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()))
}
