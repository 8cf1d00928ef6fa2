//! Package integrity and publisher trust verification.
//!
//! Order of checks:
//!
//! 1. SHA-256 of the payload must equal `meta.content_hash`.
//! 2. `meta.timestamp` must not be in the future.
//! 3. Unsigned packages pass only if the configuration allows them.
//! 4. The signing certificate is found in the local trust store by
//!    thumbprint, or taken from the package and chained to trusted publishers.
//! 5. The RSA PKCS#1 v1.5 signature over the payload (SHA-1 digest, the
//!    legacy wire format) must verify against that certificate.
//! 6. `meta.timestamp` must fall inside the certificate's validity window.

use crate::config::AppletConfig;
use crate::error::IntegrityError;
use crate::trust::{Certificate, CertificateTrustResolver};
use applet_schema::{ContentHash, SignedPackage, Thumbprint};
use chrono::{DateTime, Utc};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha1::Sha1;
use std::sync::Arc;

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Accepted without a signature because unsigned packages are allowed.
    Unsigned,
    /// Signature verified against a trusted certificate.
    Signed {
        /// Subject of the signing certificate.
        subject: String,
        /// Thumbprint of the signing certificate.
        thumbprint: Thumbprint,
    },
}

/// Verifies content hashes and publisher signatures.
#[derive(Clone)]
pub struct PackageIntegrityVerifier {
    resolver: Arc<dyn CertificateTrustResolver>,
}

impl std::fmt::Debug for PackageIntegrityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageIntegrityVerifier")
            .finish_non_exhaustive()
    }
}

impl PackageIntegrityVerifier {
    /// Verifier resolving signers through `resolver`.
    pub fn new(resolver: Arc<dyn CertificateTrustResolver>) -> Self {
        Self { resolver }
    }

    /// Verify `package` against the current time.
    ///
    /// # Errors
    ///
    /// Returns the first [`IntegrityError`] encountered.
    pub fn verify<P: SignedPackage + ?Sized>(
        &self,
        package: &P,
        config: &dyn AppletConfig,
    ) -> Result<Verification, IntegrityError> {
        self.verify_at(package, config, Utc::now())
    }

    /// Verify `package` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns the first [`IntegrityError`] encountered.
    pub fn verify_at<P: SignedPackage + ?Sized>(
        &self,
        package: &P,
        config: &dyn AppletConfig,
        now: DateTime<Utc>,
    ) -> Result<Verification, IntegrityError> {
        let meta = package.meta();
        let payload = package.payload();

        let actual = ContentHash::compute(&payload);
        if actual != meta.content_hash {
            return Err(IntegrityError::ContentCorrupt {
                expected: meta.content_hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        if meta.timestamp > now {
            return Err(IntegrityError::FutureTimestamp(meta.timestamp));
        }

        let Some(signature) = meta.signature.as_deref() else {
            if config.allow_unsigned_packages() {
                tracing::debug!(id = %meta.id, "accepting unsigned package");
                return Ok(Verification::Unsigned);
            }
            return Err(IntegrityError::UntrustedUnsigned);
        };

        let cert = self.resolve_certificate(package, config, now)?;

        let public_key = cert
            .rsa_public_key()
            .map_err(|e| IntegrityError::UntrustedPublisher(e.to_string()))?;
        let signature =
            Signature::try_from(signature).map_err(|_| IntegrityError::SignatureMismatch)?;
        VerifyingKey::<Sha1>::new(public_key)
            .verify(&payload, &signature)
            .map_err(|_| IntegrityError::SignatureMismatch)?;

        if !cert.is_valid_at(meta.timestamp) {
            return Err(IntegrityError::ExpiredOrNotYetValidCertificate);
        }

        tracing::debug!(id = %meta.id, signer = cert.subject(), "signature verified");
        Ok(Verification::Signed {
            subject: cert.subject().to_string(),
            thumbprint: cert.thumbprint().clone(),
        })
    }

    /// Trust-store lookup by thumbprint, falling back to the embedded
    /// certificate validated against the trusted-publisher list.
    fn resolve_certificate<P: SignedPackage + ?Sized>(
        &self,
        package: &P,
        config: &dyn AppletConfig,
        now: DateTime<Utc>,
    ) -> Result<Certificate, IntegrityError> {
        let meta = package.meta();
        if let Some(cert) = self.resolver.find_by_thumbprint(&meta.public_key_token) {
            tracing::debug!(id = %meta.id, thumbprint = %meta.public_key_token, "publisher found in trust store");
            return Ok(cert);
        }

        let embedded = package.embedded_certificate().ok_or_else(|| {
            IntegrityError::UntrustedPublisher(format!(
                "no certificate for {} in the trust store and none embedded",
                meta.public_key_token
            ))
        })?;
        let cert = Certificate::parse(embedded)
            .map_err(|e| IntegrityError::UntrustedPublisher(e.to_string()))?;

        let chain = self.resolver.build_chain(&cert, now);
        chain
            .check_trusted(&config.trusted_publishers())
            .map_err(IntegrityError::UntrustedPublisher)?;

        tracing::debug!(id = %meta.id, subject = cert.subject(), depth = chain.elements.len(), "embedded publisher chain trusted");
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::X509TrustStore;
    use applet_schema::{AppletVersion, PackageArtifact, PackageId, PackageMetadata, SolutionPackage};
    use chrono::{Duration, TimeZone};
    use rsa::RsaPrivateKey;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use std::collections::HashSet;
    use std::path::PathBuf;

    const ROOT: &[u8] = include_bytes!("../tests/fixtures/root.der");
    const PUBLISHER: &[u8] = include_bytes!("../tests/fixtures/publisher.der");
    const PUBLISHER_KEY: &str = include_str!("../tests/fixtures/publisher.key");
    const EXPIRED: &[u8] = include_bytes!("../tests/fixtures/expired.der");
    const EXPIRED_KEY: &str = include_str!("../tests/fixtures/expired.key");
    const ROGUE: &[u8] = include_bytes!("../tests/fixtures/rogue.der");
    const ROGUE_KEY: &str = include_str!("../tests/fixtures/rogue.key");

    struct TestConfig {
        allow_unsigned: bool,
        trusted: HashSet<Thumbprint>,
    }

    impl AppletConfig for TestConfig {
        fn applet_directory(&self) -> PathBuf {
            PathBuf::from("unused")
        }
        fn trusted_publishers(&self) -> HashSet<Thumbprint> {
            self.trusted.clone()
        }
        fn allow_unsigned_packages(&self) -> bool {
            self.allow_unsigned
        }
    }

    fn strict() -> TestConfig {
        TestConfig {
            allow_unsigned: false,
            trusted: HashSet::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn thumbprint(der: &[u8]) -> Thumbprint {
        Certificate::from_der(der).unwrap().thumbprint().clone()
    }

    fn sign(key_pem: &str, payload: &[u8]) -> Vec<u8> {
        let key = RsaPrivateKey::from_pkcs8_pem(key_pem).unwrap();
        SigningKey::<Sha1>::new(key).sign(payload).to_vec()
    }

    fn unsigned(manifest: &[u8]) -> PackageArtifact {
        PackageArtifact {
            meta: PackageMetadata {
                id: PackageId::new("org.example"),
                version: AppletVersion::new("1.0"),
                author: "Example".into(),
                content_hash: ContentHash::compute(manifest),
                signature: None,
                public_key_token: Thumbprint::default(),
                dependencies: vec![],
                timestamp: now() - Duration::days(1),
            },
            manifest: manifest.to_vec(),
            embedded_certificate: None,
        }
    }

    fn signed_with(cert: &[u8], key: &str, manifest: &[u8]) -> PackageArtifact {
        let mut artifact = unsigned(manifest);
        artifact.meta.signature = Some(sign(key, manifest));
        artifact.meta.public_key_token = thumbprint(cert);
        artifact
    }

    fn verifier(certs: &[&[u8]]) -> PackageIntegrityVerifier {
        let store =
            X509TrustStore::from_certificates(certs.iter().map(|d| Certificate::from_der(d).unwrap()));
        PackageIntegrityVerifier::new(Arc::new(store))
    }

    #[test]
    fn test_hash_mismatch_is_content_corrupt() {
        let mut artifact = unsigned(b"{}");
        artifact.manifest[0] ^= 0x01;
        let err = verifier(&[])
            .verify_at(&artifact, &strict(), now())
            .unwrap_err();
        assert!(matches!(err, IntegrityError::ContentCorrupt { .. }));
    }

    #[test]
    fn test_unsigned_policy() {
        let artifact = unsigned(b"{}");
        let v = verifier(&[]);
        assert_eq!(
            v.verify_at(&artifact, &strict(), now()),
            Err(IntegrityError::UntrustedUnsigned)
        );

        let lenient = TestConfig {
            allow_unsigned: true,
            trusted: HashSet::new(),
        };
        assert_eq!(
            v.verify_at(&artifact, &lenient, now()),
            Ok(Verification::Unsigned)
        );
    }

    #[test]
    fn test_future_timestamp_rejected_even_when_signature_bad() {
        let mut artifact = signed_with(PUBLISHER, PUBLISHER_KEY, b"payload");
        artifact.meta.timestamp = now() + Duration::hours(1);
        artifact.meta.signature = Some(vec![0; 256]);
        let err = verifier(&[PUBLISHER])
            .verify_at(&artifact, &strict(), now())
            .unwrap_err();
        assert!(matches!(err, IntegrityError::FutureTimestamp(_)));
    }

    #[test]
    fn test_trust_store_signature_roundtrip() {
        let artifact = signed_with(PUBLISHER, PUBLISHER_KEY, b"payload");
        let result = verifier(&[PUBLISHER])
            .verify_at(&artifact, &strict(), now())
            .unwrap();
        assert_eq!(
            result,
            Verification::Signed {
                subject: Certificate::from_der(PUBLISHER).unwrap().subject().to_string(),
                thumbprint: thumbprint(PUBLISHER),
            }
        );
    }

    #[test]
    fn test_resigned_mutated_payload_mismatches() {
        // Hash is updated to the new payload but the signature still covers the old one.
        let mut artifact = signed_with(PUBLISHER, PUBLISHER_KEY, b"payload");
        artifact.manifest = b"payload!".to_vec();
        artifact.meta.content_hash = ContentHash::compute(&artifact.manifest);
        assert_eq!(
            verifier(&[PUBLISHER]).verify_at(&artifact, &strict(), now()),
            Err(IntegrityError::SignatureMismatch)
        );
    }

    #[test]
    fn test_signature_from_wrong_key_mismatches() {
        let mut artifact = signed_with(PUBLISHER, ROGUE_KEY, b"payload");
        artifact.meta.public_key_token = thumbprint(PUBLISHER);
        assert_eq!(
            verifier(&[PUBLISHER]).verify_at(&artifact, &strict(), now()),
            Err(IntegrityError::SignatureMismatch)
        );
    }

    #[test]
    fn test_embedded_certificate_chained_to_trusted_root() {
        let mut artifact = signed_with(PUBLISHER, PUBLISHER_KEY, b"payload");
        artifact.embedded_certificate = Some(PUBLISHER.to_vec());
        let config = TestConfig {
            allow_unsigned: false,
            trusted: [thumbprint(PUBLISHER), thumbprint(ROOT)].into(),
        };
        assert!(verifier(&[ROOT]).verify_at(&artifact, &config, now()).is_ok());

        // Issuer not in the trusted-publisher list.
        let partial = TestConfig {
            allow_unsigned: false,
            trusted: [thumbprint(PUBLISHER)].into(),
        };
        assert!(matches!(
            verifier(&[ROOT]).verify_at(&artifact, &partial, now()),
            Err(IntegrityError::UntrustedPublisher(_))
        ));
    }

    #[test]
    fn test_rogue_self_signed_is_untrusted() {
        let mut artifact = signed_with(ROGUE, ROGUE_KEY, b"payload");
        artifact.embedded_certificate = Some(ROGUE.to_vec());
        let config = TestConfig {
            allow_unsigned: false,
            trusted: [thumbprint(ROGUE)].into(),
        };
        assert!(matches!(
            verifier(&[ROOT]).verify_at(&artifact, &config, now()),
            Err(IntegrityError::UntrustedPublisher(_))
        ));
    }

    #[test]
    fn test_missing_certificate_is_untrusted() {
        let artifact = signed_with(PUBLISHER, PUBLISHER_KEY, b"payload");
        assert!(matches!(
            verifier(&[ROOT]).verify_at(&artifact, &strict(), now()),
            Err(IntegrityError::UntrustedPublisher(_))
        ));
    }

    #[test]
    fn test_timestamp_outside_certificate_window() {
        let artifact = signed_with(EXPIRED, EXPIRED_KEY, b"payload");
        assert_eq!(
            verifier(&[EXPIRED]).verify_at(&artifact, &strict(), now()),
            Err(IntegrityError::ExpiredOrNotYetValidCertificate)
        );

        let mut in_window = artifact.clone();
        in_window.meta.timestamp = Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap();
        assert!(
            verifier(&[EXPIRED])
                .verify_at(&in_window, &strict(), now())
                .is_ok()
        );
    }

    #[test]
    fn test_solution_payload_is_concatenated_includes() {
        let a = unsigned(b"{\"a\":1}");
        let b = unsigned(b"{\"b\":2}");
        let joined = b"{\"a\":1}{\"b\":2}";
        let mut solution = SolutionPackage {
            meta: signed_with(PUBLISHER, PUBLISHER_KEY, joined).meta,
            include: vec![a, b],
            embedded_certificate: None,
        };
        let v = verifier(&[PUBLISHER]);
        assert!(v.verify_at(&solution, &strict(), now()).is_ok());

        solution.include.swap(0, 1);
        assert!(matches!(
            v.verify_at(&solution, &strict(), now()),
            Err(IntegrityError::ContentCorrupt { .. })
        ));
    }
}
