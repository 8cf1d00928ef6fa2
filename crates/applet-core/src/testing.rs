//! Shared fixtures for unit tests.

use crate::config::{AppletConfig, DependencyPolicy};
use crate::registry::AppletRegistry;
use crate::templates::InMemoryTemplateRegistry;
use crate::trust::X509TrustStore;
use applet_schema::{
    AppletInfo, AppletManifest, AppletVersion, ContentHash, DependencyRef, PackageArtifact,
    PackageId, PackageMetadata, SignedPackage, SolutionPackage, TemplateDescriptor, Thumbprint,
};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) struct TestConfig {
    pub(crate) dir: PathBuf,
    pub(crate) allow_unsigned: bool,
    pub(crate) policy: DependencyPolicy,
}

impl TestConfig {
    pub(crate) fn permissive(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            allow_unsigned: true,
            policy: DependencyPolicy::Warn,
        }
    }
}

impl AppletConfig for TestConfig {
    fn applet_directory(&self) -> PathBuf {
        self.dir.clone()
    }
    fn trusted_publishers(&self) -> HashSet<Thumbprint> {
        HashSet::new()
    }
    fn allow_unsigned_packages(&self) -> bool {
        self.allow_unsigned
    }
    fn dependency_policy(&self) -> DependencyPolicy {
        self.policy
    }
}

pub(crate) fn registry(config: TestConfig) -> (AppletRegistry, Arc<InMemoryTemplateRegistry>) {
    let templates = Arc::new(InMemoryTemplateRegistry::new());
    let registry = AppletRegistry::new(
        Arc::new(config),
        Arc::new(X509TrustStore::new()),
        templates.clone(),
    );
    (registry, templates)
}

pub(crate) fn template(mnemonic: &str, name: &str) -> TemplateDescriptor {
    TemplateDescriptor {
        mnemonic: mnemonic.into(),
        name: name.into(),
        description: None,
        definition: serde_json::json!({}),
    }
}

/// Unsigned artifact whose manifest agrees with its metadata.
pub(crate) fn artifact(
    id: &str,
    version: &str,
    deps: &[(&str, &str)],
    templates: Vec<TemplateDescriptor>,
) -> PackageArtifact {
    let dependencies: Vec<DependencyRef> = deps
        .iter()
        .map(|(id, v)| DependencyRef::new(id, v))
        .collect();
    let manifest = AppletManifest {
        info: AppletInfo {
            id: PackageId::new(id),
            version: AppletVersion::new(version),
            name: None,
            author: None,
            dependencies: dependencies.clone(),
        },
        templates,
    }
    .to_bytes()
    .unwrap();

    PackageArtifact {
        meta: PackageMetadata {
            id: PackageId::new(id),
            version: AppletVersion::new(version),
            author: "Test".into(),
            content_hash: ContentHash::compute(&manifest),
            signature: None,
            public_key_token: Thumbprint::default(),
            dependencies,
            timestamp: Utc::now() - Duration::hours(1),
        },
        manifest,
        embedded_certificate: None,
    }
}

/// Unsigned solution envelope over `include`.
pub(crate) fn solution(id: &str, version: &str, include: Vec<PackageArtifact>) -> SolutionPackage {
    let mut meta = artifact(id, version, &[], vec![]).meta;
    let mut package = SolutionPackage {
        meta: meta.clone(),
        include,
        embedded_certificate: None,
    };
    meta.content_hash = ContentHash::compute(&package.payload());
    package.meta = meta;
    package
}
