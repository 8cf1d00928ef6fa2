//! Solution packages: signed envelopes that install a set of applets into a
//! private scope and promote them into the global scope.

use crate::error::{InstallError, UninstallError};
use crate::registry::{AppletRegistry, FileKey, Origin};
use crate::resolver::install_order;
use applet_schema::version::is_newer;
use applet_schema::{
    AppletManifest, AppletVersion, PackageId, PackageMetadata, ScopeId, SolutionPackage,
    encode_solution,
};
use std::sync::Arc;

/// An installed solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionRecord {
    /// Solution id.
    pub id: PackageId,
    /// Envelope version.
    pub version: AppletVersion,
    /// Publisher named in the envelope metadata.
    pub author: String,
    /// The private scope holding the included applets.
    pub scope: ScopeId,
    /// Ids of the included applets, in envelope order.
    pub includes: Vec<PackageId>,
}

/// How to reverse one include installed by a cascade.
struct Undo {
    id: PackageId,
    /// The manifest and artifact bytes it replaced, if any.
    previous: Option<(Arc<AppletManifest>, Vec<u8>)>,
}

/// Installs and removes solutions on top of an [`AppletRegistry`].
#[derive(Debug, Clone)]
pub struct SolutionManager {
    registry: AppletRegistry,
}

impl SolutionManager {
    /// Wrap a registry.
    pub fn new(registry: AppletRegistry) -> Self {
        Self { registry }
    }

    /// The registry solutions are installed into.
    pub fn registry(&self) -> &AppletRegistry {
        &self.registry
    }

    /// Install a solution envelope and cascade its applets.
    ///
    /// Each included applet lands in the solution's private scope when it is
    /// absent there or older. Every applet in the private scope is then
    /// promoted into the global scope if it is newer than what global holds,
    /// so the global scope never moves backwards.
    ///
    /// # Errors
    ///
    /// - [`InstallError::Integrity`] if the envelope or any included applet
    ///   fails verification; nothing is installed in that case
    /// - [`InstallError::AlreadyExists`] if the solution is installed and
    ///   `is_upgrade` is not set
    /// - any error from installing an included applet or writing the
    ///   envelope; the private scope, its files and the envelope are put back
    ///   as they were
    pub fn install_solution(
        &self,
        solution: &SolutionPackage,
        is_upgrade: bool,
    ) -> Result<SolutionRecord, InstallError> {
        let _guard = self.registry.lock_installs();
        self.install_solution_locked(solution, is_upgrade, Origin::Fresh)
    }

    pub(crate) fn install_solution_locked(
        &self,
        solution: &SolutionPackage,
        is_upgrade: bool,
        origin: Origin<'_>,
    ) -> Result<SolutionRecord, InstallError> {
        let registry = &self.registry;
        let id = &solution.meta.id;

        if let Err(e) = registry.verifier().verify(solution, registry.config()) {
            tracing::warn!(solution = %id, error = %e, "solution rejected");
            return Err(e.into());
        }

        let existing = registry.read().solutions.contains_key(id);
        if existing && !is_upgrade {
            return Err(InstallError::AlreadyExists {
                scope: "installed solutions".to_string(),
                id: id.clone(),
            });
        }

        // Verification is pure, so checking every include up front keeps an
        // untrusted include from leaving a half-populated scope behind.
        for include in &solution.include {
            if let Err(e) = registry.verifier().verify(include, registry.config()) {
                tracing::warn!(solution = %id, include = %include.meta.id, error = %e, "included package rejected");
                return Err(e.into());
            }
        }

        let scope = ScopeId::solution(id);
        let created = registry.ensure_scope(&scope);
        let mut undo: Vec<Undo> = Vec::new();

        let staged = self
            .cascade(solution, &scope, &mut undo)
            .and_then(|()| match origin {
                Origin::Fresh => {
                    let bytes = encode_solution(solution)?;
                    Ok(registry.store().persist_solution(id, &bytes, is_upgrade)?)
                }
                Origin::OnDisk(path) => Ok(path.to_path_buf()),
            });
        let envelope = match staged {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(solution = %id, error = %e, "solution install failed, rolling back");
                self.roll_back(&scope, created, undo);
                return Err(e);
            }
        };

        let mut promoted = 0usize;
        for manifest in registry.snapshot(&scope).iter() {
            if registry.promote_locked(manifest) {
                promoted += 1;
            }
        }

        registry.index_file(FileKey::Solution(id.clone()), envelope);
        let record = SolutionRecord {
            id: id.clone(),
            version: solution.meta.version.clone(),
            author: solution.meta.author.clone(),
            scope,
            includes: solution.include.iter().map(|a| a.meta.id.clone()).collect(),
        };
        registry
            .write()
            .solutions
            .insert(id.clone(), record.clone());

        tracing::info!(
            solution = %id,
            version = %record.version,
            includes = record.includes.len(),
            promoted,
            "solution installed"
        );
        Ok(record)
    }

    /// Remove a solution, its envelope and its private scope.
    ///
    /// Applets promoted into the global scope stay there.
    ///
    /// # Errors
    ///
    /// - [`UninstallError::NotFound`] if the solution is not installed
    /// - [`UninstallError::Storage`] if its files cannot be deleted
    pub fn uninstall_solution(&self, id: &PackageId) -> Result<(), UninstallError> {
        let registry = &self.registry;
        let _guard = registry.lock_installs();

        let record = registry.read().solutions.get(id).cloned();
        let Some(record) = record else {
            return Err(UninstallError::NotFound(id.clone()));
        };

        // The envelope goes last so a failure here leaves it to be reloaded.
        registry.store().remove_scope_dir(&record.scope)?;
        let key = FileKey::Solution(id.clone());
        if let Some(path) = registry.file_path(&key) {
            registry.store().delete(&path)?;
            registry.take_file(&key);
        }
        registry.drop_scope(&record.scope);
        registry.write().solutions.remove(id);

        tracing::info!(solution = %id, "solution uninstalled");
        Ok(())
    }

    /// Installed solutions, ordered by id.
    pub fn solutions(&self) -> Vec<SolutionRecord> {
        self.registry.read().solutions.values().cloned().collect()
    }

    /// Record of an installed solution.
    pub fn get_solution(&self, id: &PackageId) -> Option<SolutionRecord> {
        self.registry.read().solutions.get(id).cloned()
    }

    /// Install every include that is absent or older in the private scope,
    /// recording how to undo each step.
    fn cascade(
        &self,
        solution: &SolutionPackage,
        scope: &ScopeId,
        undo: &mut Vec<Undo>,
    ) -> Result<(), InstallError> {
        let registry = &self.registry;
        let metas: Vec<&PackageMetadata> = solution.include.iter().map(|a| &a.meta).collect();
        for index in install_order(&metas) {
            let include = &solution.include[index];
            let include_id = &include.meta.id;
            let current = registry.get(scope, include_id);
            if current
                .as_ref()
                .is_some_and(|m| !is_newer(m.version(), &include.meta.version))
            {
                tracing::debug!(solution = %solution.meta.id, include = %include_id, "include already current");
                continue;
            }

            let previous = match current {
                Some(manifest) => {
                    let path = registry
                        .file_path(&FileKey::applet(scope, include_id))
                        .ok_or_else(|| {
                            InstallError::Manifest(format!(
                                "no artifact on file for '{include_id}' in {scope}"
                            ))
                        })?;
                    Some((manifest, registry.store().load(&path)?))
                }
                None => None,
            };

            registry.install_locked(scope, include, true, Origin::Fresh)?;
            undo.push(Undo {
                id: include_id.clone(),
                previous,
            });
        }
        Ok(())
    }

    /// Undo a failed cascade: drop a scope this install created, otherwise put
    /// every replaced include back in reverse order.
    fn roll_back(&self, scope: &ScopeId, created: bool, undo: Vec<Undo>) {
        if created {
            self.discard_scope(scope);
            return;
        }
        for step in undo.into_iter().rev() {
            let restored = match step.previous {
                Some((manifest, bytes)) => self.registry.restore_locked(scope, manifest, &bytes),
                None => self.registry.evict_locked(scope, &step.id),
            };
            if let Err(e) = restored {
                tracing::error!(%scope, id = %step.id, error = %e, "failed to roll back include");
            }
        }
    }

    fn discard_scope(&self, scope: &ScopeId) {
        self.registry.drop_scope(scope);
        if let Err(e) = self.registry.store().remove_scope_dir(scope) {
            tracing::warn!(%scope, error = %e, "failed to remove scope directory");
        }
    }
}
