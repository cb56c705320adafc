//! TLS configuration and certificate loading.
//!
//! Turns a declarative `TlsConfig` into ready-to-use rustls material:
//! - Root CAs: PEM literal, else CA files, else the system trust store
//! - Identity: PEM literals, else certificate/key files
//! - No identity and not explicitly enabled means TLS is disabled, even if
//!   a CA was supplied

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;

use crate::config::schema::TlsConfig;

/// TLS 1.2 is the minimum accepted version.
static PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid PEM in {origin}: {source}")]
    Pem {
        origin: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to add CA cert from {0}")]
    NoCaCertificate(String),

    #[error("no certificate found in {0}")]
    NoCertificate(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("error setting up root CA pool from system trust store: {0}")]
    SystemRoots(String),

    #[error("a certificate key pair is required")]
    MissingIdentity,

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// A certificate chain and its private key.
#[derive(Debug)]
pub struct Identity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

/// Resolved TLS material.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub roots: RootCertStore,
    pub identity: Option<Identity>,
    pub insecure: bool,
}

impl TlsConfig {
    /// Resolve this config into TLS material.
    ///
    /// Returns `Ok(None)` when TLS is disabled: not `enabled` and no
    /// certificate configured.
    pub fn materialize(&self) -> Result<Option<TlsMaterial>, TlsError> {
        let explicit_roots = if !self.ca.is_empty() {
            Some(load_ca_from_value(&self.ca)?)
        } else if !self.ca_files.is_empty() {
            Some(load_ca_from_files(&self.ca_files)?)
        } else {
            None
        };

        let identity = if !self.cert.is_empty() && !self.key.is_empty() {
            Some(load_cert_from_values(&self.cert, &self.key)?)
        } else if !self.cert_file.is_empty() && !self.key_file.is_empty() {
            Some(load_cert_from_files(
                Path::new(&self.cert_file),
                Path::new(&self.key_file),
            )?)
        } else {
            None
        };

        if !self.enabled && identity.is_none() {
            tracing::debug!("TLS disabled: not enabled and no certificate configured");
            return Ok(None);
        }

        let roots = match explicit_roots {
            Some(roots) => roots,
            None => load_system_roots()?,
        };

        Ok(Some(TlsMaterial {
            roots,
            identity,
            insecure: self.insecure,
        }))
    }
}

impl TlsMaterial {
    /// Server-side rustls config. Requires an identity.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>, TlsError> {
        let identity = self.identity.as_ref().ok_or(TlsError::MissingIdentity)?;

        let mut config = ServerConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)?
            .with_no_client_auth()
            .with_single_cert(identity.cert_chain.clone(), identity.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Arc::new(config))
    }

    /// Client-side rustls config, presenting the identity if one is set.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        let builder = ClientConfig::builder_with_provider(crypto_provider())
            .with_protocol_versions(PROTOCOL_VERSIONS)?;

        let builder = if self.insecure {
            tracing::warn!("TLS server certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(crypto_provider())))
        } else {
            builder.with_root_certificates(self.roots.clone())
        };

        let config = match &self.identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())?,
            None => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }
}

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Load a certificate key pair from PEM values.
pub fn load_cert_from_values(cert_pem: &str, key_pem: &str) -> Result<Identity, TlsError> {
    read_identity(cert_pem.as_bytes(), key_pem.as_bytes(), "value")
}

/// Load a certificate key pair from PEM files.
pub fn load_cert_from_files(cert_path: &Path, key_path: &Path) -> Result<Identity, TlsError> {
    let cert_pem = read_file(cert_path)?;
    let key_pem = read_file(key_path)?;

    let cert_chain = parse_certs(&cert_pem, &cert_path.display().to_string())?;
    let key = parse_key(&key_pem, &key_path.display().to_string())?;
    Ok(Identity { cert_chain, key })
}

/// Load a CA pool from a PEM value.
pub fn load_ca_from_value(ca_pem: &str) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    add_ca_certs(&mut roots, ca_pem.as_bytes(), "value")?;
    Ok(roots)
}

/// Load a CA pool from PEM files. Every file must contribute a certificate.
pub fn load_ca_from_files<P: AsRef<Path>>(ca_files: &[P]) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for path in ca_files {
        let path = path.as_ref();
        let pem = read_file(path)?;
        add_ca_certs(&mut roots, &pem, &path.display().to_string())?;
    }
    Ok(roots)
}

fn load_system_roots() -> Result<RootCertStore, TlsError> {
    let result = rustls_native_certs::load_native_certs();
    if result.certs.is_empty() {
        if let Some(err) = result.errors.first() {
            return Err(TlsError::SystemRoots(err.to_string()));
        }
    }
    for err in &result.errors {
        tracing::warn!(error = %err, "Skipping unreadable system certificates");
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    tracing::debug!(added, ignored, "Loaded system root certificates");
    Ok(roots)
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_identity(cert_pem: &[u8], key_pem: &[u8], origin: &str) -> Result<Identity, TlsError> {
    Ok(Identity {
        cert_chain: parse_certs(cert_pem, origin)?,
        key: parse_key(key_pem, origin)?,
    })
}

fn parse_certs(pem: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            origin: origin.to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(origin.to_string()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|source| TlsError::Pem {
            origin: origin.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(origin.to_string()))
}

fn add_ca_certs(roots: &mut RootCertStore, pem: &[u8], origin: &str) -> Result<(), TlsError> {
    let certs = parse_certs(pem, origin).map_err(|err| match err {
        TlsError::NoCertificate(origin) => TlsError::NoCaCertificate(origin),
        other => other,
    })?;

    let (added, _) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::NoCaCertificate(origin.to_string()));
    }
    Ok(())
}

/// Accepts any server certificate; only used when `insecure` is set.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build an axum-server TLS config from resolved material.
pub fn rustls_config(material: &TlsMaterial) -> Result<axum_server::tls_rustls::RustlsConfig, TlsError> {
    Ok(axum_server::tls_rustls::RustlsConfig::from_config(
        material.server_config()?,
    ))
}
