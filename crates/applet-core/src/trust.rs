//! Publisher certificate resolution.
//!
//! A [`CertificateTrustResolver`] does two things for the verifier: find a
//! certificate in the local trusted-publisher store by thumbprint, and build
//! the issuer chain for a certificate that shipped embedded in a package.
//!
//! Revocation is never checked (no network access); every chain therefore
//! carries [`ChainStatus::RevocationStatusUnknown`], which callers tolerate.

use applet_schema::Thumbprint;
use chrono::{DateTime, Utc};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use x509_parser::prelude::*;

/// Longest issuer chain we will walk before giving up.
const MAX_CHAIN_DEPTH: usize = 8;

const CERT_EXTENSIONS: &[&str] = &["der", "cer", "crt", "pem"];

/// Errors from parsing certificates or loading a trust store.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The bytes are neither DER nor PEM X.509.
    #[error("malformed certificate: {0}")]
    Malformed(String),

    /// The subject key is not RSA or could not be decoded.
    #[error("certificate public key is not a usable RSA key: {0}")]
    UnsupportedKey(String),

    /// The trust directory or a file in it could not be read.
    #[error("failed to read trust store {}: {source}", path.display())]
    Io {
        /// The path being read.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// An X.509 certificate with the fields the verifier needs pulled out.
#[derive(Debug, Clone)]
pub struct Certificate {
    der: Vec<u8>,
    thumbprint: Thumbprint,
    subject: String,
    subject_raw: Vec<u8>,
    issuer_raw: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Certificate {
    /// Parse a DER or PEM encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Malformed`] if the bytes are neither.
    pub fn parse(bytes: &[u8]) -> Result<Self, CertificateError> {
        if bytes.starts_with(b"-----BEGIN") {
            let (_, pem) = x509_parser::pem::parse_x509_pem(bytes)
                .map_err(|e| CertificateError::Malformed(e.to_string()))?;
            Self::from_der(&pem.contents)
        } else {
            Self::from_der(bytes)
        }
    }

    /// Parse a DER encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::Malformed`] on any parse failure.
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CertificateError::Malformed(e.to_string()))?;

        let validity = cert.validity();
        let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
            .ok_or_else(|| CertificateError::Malformed("notBefore out of range".into()))?;
        let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
            .ok_or_else(|| CertificateError::Malformed("notAfter out of range".into()))?;

        Ok(Self {
            der: der.to_vec(),
            thumbprint: Thumbprint::new(Sha1::digest(der).to_vec()),
            subject: cert.subject().to_string(),
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            not_before,
            not_after,
        })
    }

    /// Raw DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-1 over the DER encoding.
    pub fn thumbprint(&self) -> &Thumbprint {
        &self.thumbprint
    }

    /// Subject distinguished name, for messages.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// True if `at` falls inside `[not_before, not_after]`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Subject and issuer names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.subject_raw == self.issuer_raw
    }

    /// True if `issuer`'s subject matches our issuer and its key verifies our signature.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        if self.issuer_raw != issuer.subject_raw {
            return false;
        }
        let (Ok((_, child)), Ok((_, parent))) = (
            X509Certificate::from_der(&self.der),
            X509Certificate::from_der(&issuer.der),
        ) else {
            return false;
        };
        child.verify_signature(Some(parent.public_key())).is_ok()
    }

    /// The certificate's RSA public key.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::UnsupportedKey`] for non-RSA keys.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey, CertificateError> {
        let (_, cert) = X509Certificate::from_der(&self.der)
            .map_err(|e| CertificateError::Malformed(e.to_string()))?;
        RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| CertificateError::UnsupportedKey(e.to_string()))
    }
}

/// Problems found while building a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainStatus {
    /// An element is outside its validity window at evaluation time.
    NotTimeValid,
    /// A self-signed element's signature does not verify.
    NotSignatureValid,
    /// No issuer could be found for the last element.
    PartialChain,
    /// The chain ends in a self-signed root that is not in the local store.
    UntrustedRoot,
    /// Revocation was not checked. Always present; never fatal.
    RevocationStatusUnknown,
}

impl ChainStatus {
    /// Every status except unknown revocation invalidates the chain.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::RevocationStatusUnknown)
    }
}

/// Result of a chain build: leaf first, root (if reached) last.
#[derive(Debug, Clone, Default)]
pub struct CertificateChain {
    /// Certificates walked, leaf first.
    pub elements: Vec<Certificate>,
    /// Problems found while building. Empty for a clean chain.
    pub status: Vec<ChainStatus>,
}

impl CertificateChain {
    /// Check the chain against the configured trusted-publisher thumbprints.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem: a fatal chain status, or
    /// an element whose thumbprint is not trusted.
    pub fn check_trusted(&self, trusted: &HashSet<Thumbprint>) -> Result<(), String> {
        if let Some(status) = self.status.iter().find(|s| s.is_fatal()) {
            return Err(format!("certificate chain is invalid ({status:?})"));
        }
        if self.elements.is_empty() {
            return Err("certificate chain is empty".to_string());
        }
        for element in &self.elements {
            if !trusted.contains(element.thumbprint()) {
                return Err(format!(
                    "'{}' ({}) is not a trusted publisher",
                    element.subject(),
                    element.thumbprint()
                ));
            }
        }
        Ok(())
    }
}

/// Finds and validates publisher certificates.
pub trait CertificateTrustResolver: Send + Sync {
    /// Look up a certificate in the local trusted-publisher store.
    fn find_by_thumbprint(&self, thumbprint: &Thumbprint) -> Option<Certificate>;

    /// Build the issuer chain for `leaf`, evaluating validity at `at`.
    fn build_chain(&self, leaf: &Certificate, at: DateTime<Utc>) -> CertificateChain;
}

impl<T: CertificateTrustResolver + ?Sized> CertificateTrustResolver for std::sync::Arc<T> {
    fn find_by_thumbprint(&self, thumbprint: &Thumbprint) -> Option<Certificate> {
        (**self).find_by_thumbprint(thumbprint)
    }

    fn build_chain(&self, leaf: &Certificate, at: DateTime<Utc>) -> CertificateChain {
        (**self).build_chain(leaf, at)
    }
}

/// Portable trust store backed by parsed X.509 certificates.
///
/// The same set serves as the trusted-publisher store (thumbprint lookup) and
/// as the pool of issuers and roots for chain building.
#[derive(Debug, Clone, Default)]
pub struct X509TrustStore {
    certificates: Vec<Certificate>,
}

impl X509TrustStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `certificates`, deduplicated.
    pub fn from_certificates(certificates: impl IntoIterator<Item = Certificate>) -> Self {
        let mut store = Self::new();
        for cert in certificates {
            store.add(cert);
        }
        store
    }

    /// Add a certificate; duplicates are ignored.
    pub fn add(&mut self, cert: Certificate) {
        if !self.certificates.contains(&cert) {
            self.certificates.push(cert);
        }
    }

    /// Number of certificates held.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Load every certificate file in `dir`. A missing directory yields an
    /// empty store; unparseable files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory exists but cannot be read.
    pub fn load_dir(dir: &Path) -> Result<Self, CertificateError> {
        let mut store = Self::new();
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "trust store directory does not exist");
            return Ok(store);
        }

        let io_err = |source| CertificateError::Io {
            path: dir.to_path_buf(),
            source,
        };
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_cert = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| CERT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if !is_cert {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|source| CertificateError::Io {
                path: path.clone(),
                source,
            })?;
            match Certificate::parse(&bytes) {
                Ok(cert) => {
                    tracing::debug!(subject = cert.subject(), thumbprint = %cert.thumbprint(), "loaded certificate");
                    store.add(cert);
                }
                Err(e) => tracing::warn!(path = %path.display(), "skipping certificate: {e}"),
            }
        }
        Ok(store)
    }

    fn find_issuer(&self, cert: &Certificate) -> Option<&Certificate> {
        self.certificates
            .iter()
            .find(|candidate| *candidate != cert && cert.is_signed_by(candidate))
    }
}

impl CertificateTrustResolver for X509TrustStore {
    fn find_by_thumbprint(&self, thumbprint: &Thumbprint) -> Option<Certificate> {
        self.certificates
            .iter()
            .find(|c| c.thumbprint() == thumbprint)
            .cloned()
    }

    fn build_chain(&self, leaf: &Certificate, at: DateTime<Utc>) -> CertificateChain {
        let mut chain = CertificateChain::default();
        let mut current = leaf.clone();

        loop {
            if !current.is_valid_at(at) && !chain.status.contains(&ChainStatus::NotTimeValid) {
                chain.status.push(ChainStatus::NotTimeValid);
            }

            if current.is_self_issued() {
                if !current.is_signed_by(&current) {
                    chain.status.push(ChainStatus::NotSignatureValid);
                } else if !self.certificates.contains(&current) {
                    chain.status.push(ChainStatus::UntrustedRoot);
                }
                chain.elements.push(current);
                break;
            }

            let issuer = self.find_issuer(&current).cloned();
            chain.elements.push(current);

            match issuer {
                Some(next) if chain.elements.len() < MAX_CHAIN_DEPTH => current = next,
                _ => {
                    chain.status.push(ChainStatus::PartialChain);
                    break;
                }
            }
        }

        chain.status.push(ChainStatus::RevocationStatusUnknown);
        chain
    }
}
