//! Domain-specific errors for package operations

use applet_schema::{DependencyRef, PackageId, WireError};
use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Why a package failed integrity or trust verification.
///
/// These are never downgraded to warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// The payload digest differs from the one in the metadata.
    #[error("content hash mismatch: expected {expected}, computed {actual}")]
    ContentCorrupt {
        /// Hex digest recorded in the metadata.
        expected: String,
        /// Hex digest of the payload as received.
        actual: String,
    },

    /// No signature, and unsigned packages are disabled.
    #[error("package is unsigned and unsigned packages are not allowed")]
    UntrustedUnsigned,

    /// No trusted certificate could be resolved for the signer.
    #[error("publisher is not trusted: {0}")]
    UntrustedPublisher(String),

    /// The signature does not verify against the resolved certificate.
    #[error("signature does not match package contents")]
    SignatureMismatch,

    /// The package claims to have been built after the current time.
    #[error("package timestamp {0} is in the future")]
    FutureTimestamp(chrono::DateTime<chrono::Utc>),

    /// The package timestamp lies outside the signing certificate's validity.
    #[error("package timestamp falls outside the signing certificate's validity window")]
    ExpiredOrNotYetValidCertificate,
}

/// Errors from installing a package into a scope.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The package failed verification.
    #[error("verification failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// The id is already installed and no upgrade was requested.
    #[error("{scope} already contains '{id}'")]
    AlreadyExists {
        /// Where the existing package lives.
        scope: String,
        /// The conflicting id.
        id: PackageId,
    },

    /// Required packages are missing under the reject policy.
    #[error("unsatisfied dependencies: {}", format_deps(.0))]
    DependencyUnsatisfied(Vec<DependencyRef>),

    /// The artifact could not be written or read back.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// The payload is not a manifest for the package its metadata names.
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// No solution owns the requested scope.
    #[error("scope {0} does not exist")]
    UnknownScope(String),

    /// The artifact could not be encoded for storage.
    #[error("failed to encode package: {0}")]
    Encode(#[from] WireError),
}

impl InstallError {
    /// The integrity error, if this failure came from verification.
    pub fn as_integrity(&self) -> Option<&IntegrityError> {
        match self {
            Self::Integrity(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors from removing a package or solution.
#[derive(Error, Debug)]
pub enum UninstallError {
    /// Nothing with that id is installed.
    #[error("'{0}' is not installed")]
    NotFound(PackageId),

    /// Other installed packages still depend on it.
    #[error("'{id}' is required by: {}", format_ids(.dependents))]
    BlockedByDependents {
        /// The package that was to be removed.
        id: PackageId,
        /// Installed packages that declare a dependency on it, sorted.
        dependents: Vec<PackageId>,
    },

    /// An artifact or directory could not be deleted.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Fatal startup-load failures. Any of these aborts the remaining batch.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A package on disk is no longer trusted.
    #[error("untrusted package {}: {source}", path.display())]
    Integrity {
        /// The offending file.
        path: PathBuf,
        /// Why verification failed.
        #[source]
        source: IntegrityError,
    },

    /// A file is not a readable package.
    #[error("corrupt package file {}: {source}", path.display())]
    Decode {
        /// The offending file.
        path: PathBuf,
        /// Why decoding failed.
        #[source]
        source: WireError,
    },

    /// A trusted package could not be installed.
    #[error("failed to load {}: {source}", path.display())]
    Install {
        /// The offending file.
        path: PathBuf,
        /// Why the install failed.
        #[source]
        source: InstallError,
    },

    /// The applet directory could not be read.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

fn format_deps(deps: &[DependencyRef]) -> String {
    deps.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_ids(ids: &[PackageId]) -> String {
    ids.iter().map(PackageId::as_str).collect::<Vec<_>>().join(", ")
}
