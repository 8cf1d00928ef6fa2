#![allow(missing_docs)]

use applet_core::{
    AppletConfig, AppletRegistry, Certificate, InMemoryTemplateRegistry, InstallError,
    IntegrityError, LoadError, Settings, SolutionManager, X509TrustStore, load_all,
};
use applet_schema::{
    AppletInfo, AppletManifest, AppletVersion, ContentHash, DependencyRef, PackageArtifact,
    PackageId, PackageMetadata, ScopeId, SignedPackage, SolutionPackage, TemplateDescriptor,
    Thumbprint,
};
use chrono::{Duration, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha1::Sha1;
use std::sync::Arc;
use tempfile::TempDir;

const ROOT: &[u8] = include_bytes!("fixtures/root.der");
const PUBLISHER: &[u8] = include_bytes!("fixtures/publisher.der");
const PUBLISHER_KEY: &str = include_str!("fixtures/publisher.key");
const EXPIRED: &[u8] = include_bytes!("fixtures/expired.der");
const EXPIRED_KEY: &str = include_str!("fixtures/expired.key");

fn thumbprint(der: &[u8]) -> Thumbprint {
    Certificate::from_der(der)
        .expect("fixture certificate")
        .thumbprint()
        .clone()
}

fn sign(key_pem: &str, payload: &[u8]) -> Vec<u8> {
    let key = RsaPrivateKey::from_pkcs8_pem(key_pem).expect("fixture key");
    SigningKey::<Sha1>::new(key).sign(payload).to_vec()
}

fn settings(home: &TempDir, trusted: &[&[u8]]) -> Settings {
    let mut settings = Settings::with_home(home.path());
    settings.trusted_publishers = trusted.iter().map(|der| thumbprint(der).to_hex()).collect();
    settings
}

/// A registry over `settings` whose trust store holds `store`.
fn open(settings: Settings, store: &[&[u8]]) -> SolutionManager {
    let store = X509TrustStore::from_certificates(
        store
            .iter()
            .map(|der| Certificate::from_der(der).expect("fixture certificate")),
    );
    let registry = AppletRegistry::new(
        Arc::new(settings),
        Arc::new(store),
        Arc::new(InMemoryTemplateRegistry::new()),
    );
    SolutionManager::new(registry)
}

fn manifest(id: &str, version: &str, deps: &[DependencyRef]) -> Vec<u8> {
    AppletManifest {
        info: AppletInfo {
            id: PackageId::new(id),
            version: AppletVersion::new(version),
            name: Some(format!("{id} applet")),
            author: Some("Example Publisher".into()),
            dependencies: deps.to_vec(),
        },
        templates: vec![TemplateDescriptor {
            mnemonic: format!("{id}.form"),
            name: "Form".into(),
            description: None,
            definition: serde_json::json!({ "fields": ["name"] }),
        }],
    }
    .to_bytes()
    .expect("manifest encodes")
}

fn signed(id: &str, version: &str, cert: &[u8], key: &str) -> PackageArtifact {
    let manifest = manifest(id, version, &[]);
    PackageArtifact {
        meta: PackageMetadata {
            id: PackageId::new(id),
            version: AppletVersion::new(version),
            author: "Example Publisher".into(),
            content_hash: ContentHash::compute(&manifest),
            signature: Some(sign(key, &manifest)),
            public_key_token: thumbprint(cert),
            dependencies: vec![],
            timestamp: Utc::now() - Duration::hours(1),
        },
        manifest,
        embedded_certificate: None,
    }
}

fn signed_solution(id: &str, version: &str, include: Vec<PackageArtifact>) -> SolutionPackage {
    let mut solution = SolutionPackage {
        meta: signed(id, version, PUBLISHER, PUBLISHER_KEY).meta,
        include,
        embedded_certificate: None,
    };
    let payload = solution.payload().into_owned();
    solution.meta.content_hash = ContentHash::compute(&payload);
    solution.meta.signature = Some(sign(PUBLISHER_KEY, &payload));
    solution
}

#[test]
fn test_signed_package_from_trust_store() {
    let home = TempDir::new().unwrap();
    let mgr = open(settings(&home, &[]), &[PUBLISHER]);
    let registry = mgr.registry();

    let installed = registry
        .install(
            &ScopeId::GLOBAL,
            &signed("org.example.crm", "1.2", PUBLISHER, PUBLISHER_KEY),
            false,
        )
        .unwrap();
    assert_eq!(installed.version().as_str(), "1.2");
    assert!(registry.config().applet_directory().join("org.example.crm.pak").exists());
}

#[test]
fn test_tampered_package_is_rejected_without_side_effects() {
    let home = TempDir::new().unwrap();
    let mgr = open(settings(&home, &[]), &[PUBLISHER]);
    let registry = mgr.registry();

    let mut artifact = signed("org.example.crm", "1.2", PUBLISHER, PUBLISHER_KEY);
    artifact.manifest = manifest("org.example.crm", "1.2", &[DependencyRef::new("evil", "")]);
    artifact.meta.content_hash = ContentHash::compute(&artifact.manifest);

    let err = registry
        .install(&ScopeId::GLOBAL, &artifact, false)
        .unwrap_err();
    assert_eq!(err.as_integrity(), Some(&IntegrityError::SignatureMismatch));
    assert!(registry.snapshot(&ScopeId::GLOBAL).is_empty());
    assert!(!registry.config().applet_directory().exists());
}

#[test]
fn test_embedded_certificate_needs_trusted_chain() {
    let home = TempDir::new().unwrap();
    let mut artifact = signed("org.example.crm", "1.0", PUBLISHER, PUBLISHER_KEY);
    artifact.embedded_certificate = Some(PUBLISHER.to_vec());

    let trusting = open(settings(&home, &[PUBLISHER, ROOT]), &[ROOT]);
    trusting
        .registry()
        .install(&ScopeId::GLOBAL, &artifact, false)
        .unwrap();

    let home = TempDir::new().unwrap();
    let wary = open(settings(&home, &[]), &[ROOT]);
    let err = wary
        .registry()
        .install(&ScopeId::GLOBAL, &artifact, false)
        .unwrap_err();
    assert!(matches!(
        err,
        InstallError::Integrity(IntegrityError::UntrustedPublisher(_))
    ));
}

#[test]
fn test_timestamp_outside_certificate_window() {
    let home = TempDir::new().unwrap();
    let mgr = open(settings(&home, &[]), &[EXPIRED]);
    let err = mgr
        .registry()
        .install(
            &ScopeId::GLOBAL,
            &signed("org.example.old", "1.0", EXPIRED, EXPIRED_KEY),
            false,
        )
        .unwrap_err();
    assert_eq!(
        err.as_integrity(),
        Some(&IntegrityError::ExpiredOrNotYetValidCertificate)
    );
}

#[test]
fn test_signed_solution_survives_reload() {
    let home = TempDir::new().unwrap();
    {
        let mgr = open(settings(&home, &[]), &[PUBLISHER]);
        let solution = signed_solution(
            "org.example.suite",
            "2.0",
            vec![
                signed("org.example.crm", "2.0", PUBLISHER, PUBLISHER_KEY),
                signed("org.example.billing", "1.4", PUBLISHER, PUBLISHER_KEY),
            ],
        );
        mgr.install_solution(&solution, false).unwrap();
        mgr.registry()
            .install(
                &ScopeId::GLOBAL,
                &signed("org.example.notes", "0.9", PUBLISHER, PUBLISHER_KEY),
                false,
            )
            .unwrap();
    }

    let mgr = open(settings(&home, &[]), &[PUBLISHER]);
    let summary = load_all(&mgr).unwrap();
    assert_eq!((summary.solutions, summary.applets), (1, 1));

    let global: Vec<String> = mgr
        .registry()
        .snapshot(&ScopeId::GLOBAL)
        .iter()
        .map(|m| m.id().to_string())
        .collect();
    assert_eq!(
        global,
        vec!["org.example.billing", "org.example.crm", "org.example.notes"]
    );
    let record = mgr.get_solution(&"org.example.suite".into()).unwrap();
    assert_eq!(record.version.as_str(), "2.0");
    assert_eq!(mgr.registry().list_scope(&record.scope).len(), 2);
}

#[test]
fn test_reload_fails_once_publisher_is_distrusted() {
    let home = TempDir::new().unwrap();
    {
        let mgr = open(settings(&home, &[]), &[PUBLISHER]);
        mgr.registry()
            .install(
                &ScopeId::GLOBAL,
                &signed("org.example.crm", "1.0", PUBLISHER, PUBLISHER_KEY),
                false,
            )
            .unwrap();
    }

    let mgr = open(settings(&home, &[]), &[]);
    match load_all(&mgr) {
        Err(LoadError::Integrity { source, .. }) => {
            assert!(matches!(source, IntegrityError::UntrustedPublisher(_)));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
