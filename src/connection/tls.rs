//! TLS configuration and support for secure connections to the graph service.
//!
//! A [`TlsConfig`] is a value captured into the transport configuration at open
//! time. Nothing here touches process-global state, so connections with
//! different TLS settings coexist safely.

use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::fs;
use std::sync::Arc;

/// ALPN protocol id for HTTP/2
const ALPN_H2: &[u8] = b"h2";

/// TLS configuration for secure graph connections.
///
/// By default, server certificates are validated against system root certificates,
/// falling back to the bundled webpki roots when the system store is empty.
///
/// # Examples
///
/// ```ignore
/// use nebula_wire::connection::TlsConfig;
///
/// // With system root certificates (production)
/// let tls = TlsConfig::builder().build()?;
///
/// // With custom CA certificate
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/path/to/ca.pem")
///     .build()?;
///
/// // For development (danger: disables verification)
/// let tls = TlsConfig::builder()
///     .danger_accept_invalid_certs(true)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = use system roots)
    ca_cert_path: Option<String>,
    /// Whether to accept invalid certificates (development only)
    danger_accept_invalid_certs: bool,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
    /// Same configuration advertising HTTP/2 via ALPN
    h2_client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Get the rustls ClientConfig used by the header-framed socket transport.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Get the rustls ClientConfig used by the HTTP/2 transport (ALPN `h2`).
    pub fn h2_client_config(&self) -> Arc<ClientConfig> {
        self.h2_client_config.clone()
    }

    /// Path of the custom CA certificate, if any.
    pub fn ca_cert_path(&self) -> Option<&str> {
        self.ca_cert_path.as_deref()
    }

    /// Check if invalid certificates are accepted (development only).
    pub fn danger_accept_invalid_certs(&self) -> bool {
        self.danger_accept_invalid_certs
    }
}

/// Two configs are equal when they carry the same settings and share the same
/// compiled rustls configuration.
impl PartialEq for TlsConfig {
    fn eq(&self, other: &Self) -> bool {
        self.ca_cert_path == other.ca_cert_path
            && self.danger_accept_invalid_certs == other.danger_accept_invalid_certs
            && Arc::ptr_eq(&self.client_config, &other.client_config)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field(
                "danger_accept_invalid_certs",
                &self.danger_accept_invalid_certs,
            )
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
    danger_accept_invalid_certs: bool,
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, system root certificates will be used.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// ⚠️ **DANGER**: Accept invalid certificates (development only).
    ///
    /// **NEVER use in production.** This disables certificate and hostname
    /// validation entirely, making the connection vulnerable to
    /// man-in-the-middle attacks.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - CA certificate file cannot be read
    /// - CA certificate is invalid PEM or contains no certificates
    pub fn build(self) -> Result<TlsConfig> {
        let client_config = if self.danger_accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled");
            let provider = CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
                .with_no_client_auth()
        } else {
            let root_store = match &self.ca_cert_path {
                Some(ca_path) => load_custom_ca(ca_path)?,
                None => load_system_roots(),
            };
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        let mut h2_client_config = client_config.clone();
        h2_client_config.alpn_protocols = vec![ALPN_H2.to_vec()];

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            danger_accept_invalid_certs: self.danger_accept_invalid_certs,
            client_config: Arc::new(client_config),
            h2_client_config: Arc::new(h2_client_config),
        })
    }
}

/// Load system root certificates, falling back to the bundled webpki roots.
fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        tracing::debug!(
            errors = result.errors.len(),
            "no usable system root certificates, using webpki roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "Failed to read CA certificate file '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {
                // Skip non-certificate items (private keys, etc.)
            }
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "Failed to parse CA certificate from '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "No valid certificates found in '{}'",
            ca_path
        )));
    }

    Ok(root_store)
}

/// Verifier that accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Parse a TLS server name (SNI) from a hostname or IP address.
///
/// # Errors
///
/// Returns an error if the hostname is invalid.
pub fn parse_server_name(hostname: &str) -> Result<ServerName<'static>> {
    // Remove trailing dot and IPv6 brackets if present
    let hostname = hostname
        .trim_end_matches('.')
        .trim_start_matches('[')
        .trim_end_matches(']');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':')
    {
        return Err(Error::Config(format!(
            "Invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("Invalid hostname for TLS: '{}'", hostname)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_builder_defaults() {
        let tls = TlsConfigBuilder::default();
        assert!(!tls.danger_accept_invalid_certs);
        assert!(tls.ca_cert_path.is_none());
    }

    #[test]
    fn test_tls_config_h2_alpn() {
        let tls = TlsConfig::builder()
            .build()
            .expect("Failed to build TLS config");

        assert!(tls.client_config().alpn_protocols.is_empty());
        assert_eq!(tls.h2_client_config().alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_tls_config_insecure() {
        let tls = TlsConfig::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("Failed to build TLS config");
        assert!(tls.danger_accept_invalid_certs());
    }

    #[test]
    fn test_tls_config_missing_ca_file() {
        let err = TlsConfig::builder()
            .ca_cert_path("/nonexistent/ca.pem")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read CA certificate"));
    }

    #[test]
    fn test_tls_config_equality_is_by_identity() {
        let a = TlsConfig::builder().build().unwrap();
        let b = TlsConfig::builder().build().unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_server_name_valid() {
        assert!(parse_server_name("localhost").is_ok());
        assert!(parse_server_name("graphd.internal.example.com").is_ok());
        assert!(parse_server_name("example.com.").is_ok());
    }

    #[test]
    fn test_parse_server_name_ip() {
        assert!(matches!(
            parse_server_name("127.0.0.1").unwrap(),
            ServerName::IpAddress(_)
        ));
        assert!(matches!(
            parse_server_name("[::1]").unwrap(),
            ServerName::IpAddress(_)
        ));
    }

    #[test]
    fn test_parse_server_name_invalid() {
        assert!(parse_server_name("").is_err());
        assert!(parse_server_name("bad host").is_err());
    }

    #[test]
    fn test_tls_config_debug() {
        let tls = TlsConfig::builder()
            .build()
            .expect("Failed to build TLS config");

        let debug_str = format!("{:?}", tls);
        assert!(debug_str.contains("TlsConfig"));
        assert!(debug_str.contains("danger_accept_invalid_certs"));
    }
}
