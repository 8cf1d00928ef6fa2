//! Identifiers, metadata and the signed package types.

use crate::hash::{ContentHash, Thumbprint};
use crate::version::AppletVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::{Borrow, Cow};

/// Identifier of an applet package, unique within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(String);

impl PackageId {
    /// Create a package id (surrounding whitespace is trimmed).
    pub fn new(id: &str) -> Self {
        Self(id.trim().to_string())
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id can be used as a single file-name component:
    /// non-empty, no path separators, no parent references, no NUL.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\', '\0'])
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

/// An isolated namespace of installed packages.
///
/// The empty scope is the always-present global scope; any other value names
/// the private scope of the solution with that id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// The global scope.
    pub const GLOBAL: ScopeId = ScopeId(String::new());

    /// Private scope of the given solution.
    pub fn solution(id: &PackageId) -> Self {
        Self(id.as_str().to_string())
    }

    /// True for the global scope.
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw scope key (empty for global).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_global() {
            write!(f, "<global>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for ScopeId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

/// A declared dependency: the id of another applet and the minimum version
/// that satisfies it (empty means any version).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    /// Id of the required applet.
    pub id: PackageId,
    /// Minimum acceptable version.
    #[serde(default)]
    pub version: AppletVersion,
}

impl DependencyRef {
    /// Create a dependency on `id` at `version` or newer.
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: PackageId::new(id),
            version: AppletVersion::new(version),
        }
    }
}

impl std::fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}>={}", self.id, self.version)
        }
    }
}

/// Identity and trust envelope of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package id (unique within a scope).
    pub id: PackageId,
    /// Package version.
    pub version: AppletVersion,
    /// Free-form author / publisher name.
    pub author: String,
    /// Expected SHA-256 digest of the signed payload.
    pub content_hash: ContentHash,
    /// RSA PKCS#1 v1.5 / SHA-1 signature over the payload, if signed.
    pub signature: Option<Vec<u8>>,
    /// Thumbprint of the signing certificate, used for trust-store lookup.
    pub public_key_token: Thumbprint,
    /// Declared dependencies.
    pub dependencies: Vec<DependencyRef>,
    /// Package build time.
    pub timestamp: DateTime<Utc>,
}

/// Anything the integrity verifier can check: metadata, the exact signed
/// payload, and an optional embedded publisher certificate.
pub trait SignedPackage {
    /// Trust envelope.
    fn meta(&self) -> &PackageMetadata;

    /// The bytes covered by the content hash and signature.
    fn payload(&self) -> Cow<'_, [u8]>;

    /// Publisher certificate shipped with the package (DER or PEM).
    fn embedded_certificate(&self) -> Option<&[u8]>;
}

/// A single applet package as delivered: metadata plus its manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageArtifact {
    /// Identity and trust envelope.
    pub meta: PackageMetadata,
    /// Signed manifest payload (JSON encoded [`AppletManifest`]).
    pub manifest: Vec<u8>,
    /// Publisher certificate, consulted only when the trust store has no match.
    pub embedded_certificate: Option<Vec<u8>>,
}

impl PackageArtifact {
    /// Decode the manifest payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is not a valid manifest.
    pub fn unpack(&self) -> Result<AppletManifest, serde_json::Error> {
        AppletManifest::from_bytes(&self.manifest)
    }
}

impl SignedPackage for PackageArtifact {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.manifest)
    }

    fn embedded_certificate(&self) -> Option<&[u8]> {
        self.embedded_certificate.as_deref()
    }
}

/// A package bundling other packages under one signed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionPackage {
    /// Identity and trust envelope of the solution itself.
    pub meta: PackageMetadata,
    /// Included packages, in install order.
    pub include: Vec<PackageArtifact>,
    /// Publisher certificate, consulted only when the trust store has no match.
    pub embedded_certificate: Option<Vec<u8>>,
}

impl SolutionPackage {
    /// Iterator over included manifest payloads, in list order.
    pub fn payload_parts(&self) -> impl Iterator<Item = &[u8]> {
        self.include.iter().map(|a| a.manifest.as_slice())
    }
}

impl SignedPackage for SolutionPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.payload_parts().flatten().copied().collect())
    }

    fn embedded_certificate(&self) -> Option<&[u8]> {
        self.embedded_certificate.as_deref()
    }
}

/// A template definition forwarded to the external template registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    /// Unique template mnemonic.
    pub mnemonic: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque template body, passed through untouched.
    #[serde(default)]
    pub definition: serde_json::Value,
}

/// Identity section of an installed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppletInfo {
    /// Applet id.
    pub id: PackageId,
    /// Applet version.
    pub version: AppletVersion,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Author as declared in the manifest.
    #[serde(default)]
    pub author: Option<String>,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,
}

/// The unpacked, installed representation of an applet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppletManifest {
    /// Identity section.
    pub info: AppletInfo,
    /// Templates contributed by this applet.
    #[serde(default)]
    pub templates: Vec<TemplateDescriptor>,
}

impl AppletManifest {
    /// Decode a JSON manifest payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `bytes` is not a valid manifest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encode as a JSON manifest payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if a template definition fails to serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Shorthand for `info.id`.
    pub fn id(&self) -> &PackageId {
        &self.info.id
    }

    /// Shorthand for `info.version`.
    pub fn version(&self) -> &AppletVersion {
        &self.info.version
    }

    /// True if this manifest declares a dependency on `id`.
    pub fn depends_on(&self, id: &PackageId) -> bool {
        self.info.dependencies.iter().any(|d| &d.id == id)
    }
}
