//! Trust and installation of applet packages.
//!
//! [`PackageIntegrityVerifier`] checks content hashes and publisher
//! signatures, [`AppletRegistry`] owns the scoped collections of installed
//! manifests, and [`SolutionManager`] layers solution envelopes with their
//! private scopes on top. [`load_all`] rebuilds everything from disk.

pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod solution;
pub mod store;
pub mod templates;
pub mod trust;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppletConfig, DependencyPolicy, Settings};
pub use error::{InstallError, IntegrityError, LoadError, UninstallError};
pub use events::{ChangeEvent, ChangeKind, ChangeReceiver};
pub use loader::{LoadSummary, load_all};
pub use registry::{AppletRegistry, FileKey, InstallState, ScopeView, Snapshot};
pub use solution::{SolutionManager, SolutionRecord};
pub use store::{PackageStore, StoreError};
pub use templates::{InMemoryTemplateRegistry, TemplateRegistry};
pub use trust::{Certificate, CertificateTrustResolver, X509TrustStore};
pub use verify::{PackageIntegrityVerifier, Verification};
