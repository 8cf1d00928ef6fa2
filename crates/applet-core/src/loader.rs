//! Startup load: rebuild the registry from the applet directory.
//!
//! Solution envelopes are restored first so their promotions land before
//! standalone applets. Standalone applets are then installed in dependency
//! order. Files already on disk are indexed where they are, not rewritten.
//!
//! Failures are fatal and stop the batch, except for a package that is
//! already present, which is logged and skipped.

use crate::error::{InstallError, LoadError};
use crate::registry::{FileKey, Origin};
use crate::resolver::install_order;
use crate::solution::SolutionManager;
use applet_schema::version::is_newer;
use applet_schema::{PackageArtifact, PackageFile, PackageMetadata, ScopeId, SolutionPackage};
use std::path::{Path, PathBuf};

/// What [`load_all`] restored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Solution envelopes installed with their includes.
    pub solutions: usize,
    /// Standalone applets installed into the global scope.
    pub applets: usize,
    /// Packages skipped because an equal or newer copy was already installed.
    pub skipped: usize,
}

/// Load every package file at the root of the applet directory.
///
/// # Errors
///
/// - [`LoadError::Decode`] for a file that is not a valid package
/// - [`LoadError::Integrity`] for a package that fails verification
/// - [`LoadError::Install`] for any other install failure
/// - [`LoadError::Storage`] if the directory or a file cannot be read
pub fn load_all(manager: &SolutionManager) -> Result<LoadSummary, LoadError> {
    let registry = manager.registry();
    let _guard = registry.lock_installs();
    let scan = registry.store().scan()?;

    let mut solutions: Vec<(PathBuf, SolutionPackage)> = Vec::new();
    let mut applets: Vec<(PathBuf, PackageArtifact)> = Vec::new();
    for path in scan.solutions.into_iter().chain(scan.applets) {
        let bytes = registry.store().load(&path)?;
        // The file's content decides its kind, not its name.
        match PackageFile::from_bytes(&bytes) {
            Ok(PackageFile::Solution(s)) => solutions.push((path, s)),
            Ok(PackageFile::Applet(a)) => applets.push((path, a)),
            Err(source) => return Err(LoadError::Decode { path, source }),
        }
    }

    let mut summary = LoadSummary::default();

    for (path, solution) in &solutions {
        match manager.install_solution_locked(solution, false, Origin::OnDisk(path)) {
            Ok(_) => summary.solutions += 1,
            Err(e) => skip_or_fail(path, e, &mut summary)?,
        }
    }

    let global = ScopeId::GLOBAL;
    let metas: Vec<&PackageMetadata> = applets.iter().map(|(_, a)| &a.meta).collect();
    for index in install_order(&metas) {
        let (path, artifact) = &applets[index];
        // A standalone file newer than a promoted copy replaces it.
        let upgrade = registry
            .get(&global, &artifact.meta.id)
            .is_some_and(|current| is_newer(current.version(), &artifact.meta.version));
        match registry.install_locked(&global, artifact, upgrade, Origin::OnDisk(path)) {
            Ok(_) => summary.applets += 1,
            Err(e) => {
                skip_or_fail(path, e, &mut summary)?;
                // A shadowed file still belongs to the global entry, so
                // uninstalling it must delete the file too.
                let key = FileKey::applet(&global, &artifact.meta.id);
                if registry.file_path(&key).is_none() {
                    registry.index_file(key, path.clone());
                }
            }
        }
    }

    tracing::info!(
        solutions = summary.solutions,
        applets = summary.applets,
        skipped = summary.skipped,
        "loaded installed packages"
    );
    Ok(summary)
}

fn skip_or_fail(path: &Path, err: InstallError, summary: &mut LoadSummary) -> Result<(), LoadError> {
    match err {
        InstallError::AlreadyExists { .. } => {
            tracing::warn!(path = %path.display(), error = %err, "skipping package");
            summary.skipped += 1;
            Ok(())
        }
        InstallError::Integrity(source) => {
            tracing::error!(path = %path.display(), error = %source, "untrusted package, aborting load");
            Err(LoadError::Integrity {
                path: path.to_path_buf(),
                source,
            })
        }
        other => {
            tracing::error!(path = %path.display(), error = %other, "install failed, aborting load");
            Err(LoadError::Install {
                path: path.to_path_buf(),
                source: other,
            })
        }
    }
}
