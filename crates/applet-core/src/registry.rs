//! Scoped registry of installed applets.
//!
//! The registry owns one ordered manifest collection per scope: the global
//! scope, plus one private scope per installed solution. Readers get cheap
//! `Arc` snapshots; writers are serialized by a single install lock and swap
//! in a new snapshot under the state lock, publishing a change event while
//! that lock is held.
//!
//! Every mutating operation validates first and touches disk before memory,
//! so a failure at any step leaves the in-memory state as it was.

use crate::config::{AppletConfig, DependencyPolicy};
use crate::error::{InstallError, UninstallError};
use crate::events::{ChangeEvent, ChangeKind, ChangeNotifier, ChangeReceiver};
use crate::resolver::{check_dependencies, check_safe_to_remove};
use crate::solution::SolutionRecord;
use crate::store::{PackageStore, StoreError};
use crate::templates::{TemplateRegistry, insert_template_if_absent};
use crate::trust::CertificateTrustResolver;
use crate::verify::PackageIntegrityVerifier;
use applet_schema::version::is_newer;
use applet_schema::{AppletManifest, PackageArtifact, PackageId, ScopeId, encode_applet};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

/// Immutable view of one scope at a point in time, ordered by id.
pub type Snapshot = Arc<[Arc<AppletManifest>]>;

/// Lifecycle of a package within one scope. Traced on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Not present in the scope.
    Absent,
    /// Signature and content are being checked.
    Verifying,
    /// Verification or a precondition failed. Nothing was written.
    Rejected,
    /// Trusted, not yet stored.
    Verified,
    /// Stored and visible to readers.
    Installed,
    /// An installed package is being replaced by a newer artifact.
    Upgraded,
    /// Deleted from the scope and disk.
    Removed,
}

/// Key of an on-disk artifact in the file index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileKey {
    /// An applet installed into a scope.
    Applet {
        /// Scope the applet was installed into.
        scope: ScopeId,
        /// The applet's id.
        id: PackageId,
    },
    /// A solution envelope.
    Solution(PackageId),
}

impl FileKey {
    /// Key for an applet artifact.
    pub fn applet(scope: &ScopeId, id: &PackageId) -> Self {
        Self::Applet {
            scope: scope.clone(),
            id: id.clone(),
        }
    }
}

/// Where the bytes of an artifact being installed live.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Origin<'a> {
    /// Not yet on disk; the registry persists it.
    Fresh,
    /// Already persisted at this path (startup load).
    OnDisk(&'a Path),
}

#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    scopes: HashMap<ScopeId, Snapshot>,
    pub(crate) solutions: BTreeMap<PackageId, SolutionRecord>,
}

struct Inner {
    config: Arc<dyn AppletConfig>,
    verifier: PackageIntegrityVerifier,
    store: PackageStore,
    templates: Arc<dyn TemplateRegistry>,
    install_lock: Mutex<()>,
    state: RwLock<RegistryState>,
    files: Mutex<HashMap<FileKey, PathBuf>>,
    notifier: ChangeNotifier,
}

/// Handle to the package registry. Cloning shares the same registry.
#[derive(Clone)]
pub struct AppletRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AppletRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppletRegistry")
            .field("root", &self.inner.store.root())
            .field("scopes", &self.scopes())
            .finish_non_exhaustive()
    }
}

fn empty_snapshot() -> Snapshot {
    Arc::from(Vec::new())
}

fn trace_transition(scope: &ScopeId, id: &PackageId, from: InstallState, to: InstallState) {
    tracing::debug!(%scope, %id, ?from, ?to, "install state");
}

impl AppletRegistry {
    /// Create an empty registry storing artifacts under the configured
    /// applet directory.
    pub fn new(
        config: Arc<dyn AppletConfig>,
        resolver: Arc<dyn CertificateTrustResolver>,
        templates: Arc<dyn TemplateRegistry>,
    ) -> Self {
        let store = PackageStore::new(config.applet_directory());
        let mut state = RegistryState::default();
        state.scopes.insert(ScopeId::GLOBAL, empty_snapshot());

        Self {
            inner: Arc::new(Inner {
                config,
                verifier: PackageIntegrityVerifier::new(resolver),
                store,
                templates,
                install_lock: Mutex::new(()),
                state: RwLock::new(state),
                files: Mutex::new(HashMap::new()),
                notifier: ChangeNotifier::default(),
            }),
        }
    }

    /// Configuration the registry was built with.
    pub fn config(&self) -> &dyn AppletConfig {
        self.inner.config.as_ref()
    }

    /// Backing artifact store.
    pub fn store(&self) -> &PackageStore {
        &self.inner.store
    }

    /// Verifier applied to every install.
    pub fn verifier(&self) -> &PackageIntegrityVerifier {
        &self.inner.verifier
    }

    /// Install `artifact` into `scope`.
    ///
    /// An artifact whose id is already present is rejected unless
    /// `is_upgrade` is set, in which case it replaces the existing entry.
    ///
    /// # Errors
    ///
    /// - [`InstallError::UnknownScope`] if `scope` does not exist
    /// - [`InstallError::Integrity`] if verification fails
    /// - [`InstallError::DependencyUnsatisfied`] under the reject policy
    /// - [`InstallError::AlreadyExists`] for a duplicate without `is_upgrade`
    /// - [`InstallError::Manifest`] if the payload does not unpack
    /// - [`InstallError::Storage`] if the artifact cannot be written
    pub fn install(
        &self,
        scope: &ScopeId,
        artifact: &PackageArtifact,
        is_upgrade: bool,
    ) -> Result<Arc<AppletManifest>, InstallError> {
        let _guard = self.lock_installs();
        self.install_locked(scope, artifact, is_upgrade, Origin::Fresh)
    }

    /// Remove a package from the global scope.
    ///
    /// # Errors
    ///
    /// - [`UninstallError::NotFound`] if it is not installed globally
    /// - [`UninstallError::BlockedByDependents`] if another global package
    ///   depends on it
    /// - [`UninstallError::Storage`] if its file cannot be deleted
    pub fn uninstall(&self, id: &PackageId) -> Result<(), UninstallError> {
        let _guard = self.lock_installs();
        let scope = ScopeId::GLOBAL;
        let installed = self.snapshot(&scope);

        if !installed.iter().any(|m| m.id() == id) {
            return Err(UninstallError::NotFound(id.clone()));
        }
        if let Err(dependents) = check_safe_to_remove(id, &installed) {
            tracing::warn!(%id, ?dependents, "uninstall blocked by dependents");
            return Err(UninstallError::BlockedByDependents {
                id: id.clone(),
                dependents,
            });
        }

        let key = FileKey::applet(&scope, id);
        if let Some(path) = self.file_path(&key) {
            self.inner.store.delete(&path)?;
            self.files().remove(&key);
        }
        self.remove_entry(&scope, id);

        trace_transition(&scope, id, InstallState::Installed, InstallState::Removed);
        tracing::info!(%id, "uninstalled");
        Ok(())
    }

    /// The manifest installed under `id` in `scope`.
    pub fn get(&self, scope: &ScopeId, id: &PackageId) -> Option<Arc<AppletManifest>> {
        self.snapshot(scope).iter().find(|m| m.id() == id).cloned()
    }

    /// Current state of `id` within `scope`.
    pub fn state_of(&self, scope: &ScopeId, id: &PackageId) -> InstallState {
        if self.get(scope, id).is_some() {
            InstallState::Installed
        } else {
            InstallState::Absent
        }
    }

    /// Current contents of `scope`; empty if the scope does not exist.
    pub fn snapshot(&self, scope: &ScopeId) -> Snapshot {
        self.scope_snapshot(scope).unwrap_or_else(empty_snapshot)
    }

    /// Read-only live view of one scope.
    pub fn list_scope(&self, scope: &ScopeId) -> ScopeView {
        ScopeView {
            scope: scope.clone(),
            registry: self.clone(),
        }
    }

    /// Every existing scope, global first.
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes: Vec<ScopeId> = self.read().scopes.keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Subscribe to changes in every scope.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.inner.notifier.subscribe(None)
    }

    /// Path of an indexed on-disk artifact.
    pub fn file_path(&self, key: &FileKey) -> Option<PathBuf> {
        self.files().get(key).cloned()
    }

    // -- crate-internal building blocks; callers hold the install lock --

    pub(crate) fn lock_installs(&self) -> MutexGuard<'_, ()> {
        self.inner
            .install_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn files(&self) -> MutexGuard<'_, HashMap<FileKey, PathBuf>> {
        self.inner
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn scope_snapshot(&self, scope: &ScopeId) -> Option<Snapshot> {
        self.read().scopes.get(scope).cloned()
    }

    pub(crate) fn install_locked(
        &self,
        scope: &ScopeId,
        artifact: &PackageArtifact,
        is_upgrade: bool,
        origin: Origin<'_>,
    ) -> Result<Arc<AppletManifest>, InstallError> {
        let meta = &artifact.meta;
        let id = &meta.id;
        let installed = self
            .scope_snapshot(scope)
            .ok_or_else(|| InstallError::UnknownScope(scope.to_string()))?;
        let previous = installed.iter().find(|m| m.id() == id).cloned();
        let start = if previous.is_some() {
            InstallState::Installed
        } else {
            InstallState::Absent
        };

        trace_transition(scope, id, start, InstallState::Verifying);
        if let Err(e) = self.inner.verifier.verify(artifact, self.config()) {
            trace_transition(scope, id, InstallState::Verifying, InstallState::Rejected);
            tracing::warn!(%scope, %id, error = %e, "package rejected");
            return Err(e.into());
        }
        trace_transition(scope, id, InstallState::Verifying, InstallState::Verified);

        if let Err(missing) = check_dependencies(meta, &installed) {
            match self.config().dependency_policy() {
                DependencyPolicy::Warn => {
                    tracing::warn!(%scope, %id, ?missing, "installing with unsatisfied dependencies");
                }
                DependencyPolicy::Reject => {
                    trace_transition(scope, id, InstallState::Verified, InstallState::Rejected);
                    return Err(InstallError::DependencyUnsatisfied(missing));
                }
            }
        }

        if previous.is_some() && !is_upgrade {
            trace_transition(scope, id, InstallState::Verified, InstallState::Rejected);
            return Err(InstallError::AlreadyExists {
                scope: scope.to_string(),
                id: id.clone(),
            });
        }

        let manifest = Arc::new(unpack(artifact)?);

        let path = match origin {
            Origin::Fresh => {
                let bytes = encode_applet(artifact)?;
                self.inner.store.persist(scope, id, &bytes, is_upgrade)?
            }
            Origin::OnDisk(path) => path.to_path_buf(),
        };
        self.files().insert(FileKey::applet(scope, id), path);

        let kind = self.put_entry(scope, manifest.clone());

        for template in &manifest.templates {
            if insert_template_if_absent(self.inner.templates.as_ref(), template) {
                tracing::debug!(%id, mnemonic = %template.mnemonic, "registered template");
            }
        }

        if let (ChangeKind::Replaced, Some(old)) = (kind, previous) {
            trace_transition(scope, id, InstallState::Verified, InstallState::Upgraded);
            trace_transition(scope, id, InstallState::Upgraded, InstallState::Installed);
            tracing::info!(
                %scope, %id, from = %old.version(), to = %manifest.version(), "upgraded"
            );
        } else {
            trace_transition(scope, id, InstallState::Verified, InstallState::Installed);
            tracing::info!(%scope, %id, version = %manifest.version(), "installed");
        }
        Ok(manifest)
    }

    /// Create `scope` if missing. Returns true if it was created.
    pub(crate) fn ensure_scope(&self, scope: &ScopeId) -> bool {
        let mut state = self.write();
        if state.scopes.contains_key(scope) {
            return false;
        }
        state.scopes.insert(scope.clone(), empty_snapshot());
        true
    }

    /// Drop a private scope from memory and the file index, publishing a
    /// removal for each of its manifests. The global scope is never dropped.
    pub(crate) fn drop_scope(&self, scope: &ScopeId) -> Vec<Arc<AppletManifest>> {
        if scope.is_global() {
            return Vec::new();
        }
        self.files()
            .retain(|key, _| !matches!(key, FileKey::Applet { scope: s, .. } if s == scope));

        let mut state = self.write();
        let Some(removed) = state.scopes.remove(scope) else {
            return Vec::new();
        };
        for manifest in removed.iter() {
            self.inner.notifier.publish(&ChangeEvent {
                scope: scope.clone(),
                package_id: manifest.id().clone(),
                kind: ChangeKind::Removed,
                manifest: None,
            });
        }
        removed.to_vec()
    }

    /// Copy `manifest` into the global scope if that makes global newer.
    /// Returns true if the global scope changed.
    pub(crate) fn promote_locked(&self, manifest: &Arc<AppletManifest>) -> bool {
        let global = ScopeId::GLOBAL;
        if let Some(current) = self.get(&global, manifest.id())
            && !is_newer(current.version(), manifest.version())
        {
            return false;
        }
        self.put_entry(&global, manifest.clone());
        tracing::info!(id = %manifest.id(), version = %manifest.version(), "promoted to global scope");
        true
    }

    /// Put back a manifest and the artifact bytes captured before it was replaced.
    pub(crate) fn restore_locked(
        &self,
        scope: &ScopeId,
        manifest: Arc<AppletManifest>,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let id = manifest.id().clone();
        let path = self.inner.store.persist(scope, &id, bytes, true)?;
        self.files().insert(FileKey::applet(scope, &id), path);
        self.put_entry(scope, manifest);
        Ok(())
    }

    /// Remove an entry and its artifact without the dependents check.
    pub(crate) fn evict_locked(&self, scope: &ScopeId, id: &PackageId) -> Result<(), StoreError> {
        if let Some(path) = self.take_file(&FileKey::applet(scope, id)) {
            self.inner.store.delete(&path)?;
        }
        self.remove_entry(scope, id);
        Ok(())
    }

    pub(crate) fn index_file(&self, key: FileKey, path: PathBuf) {
        self.files().insert(key, path);
    }

    pub(crate) fn take_file(&self, key: &FileKey) -> Option<PathBuf> {
        self.files().remove(key)
    }

    /// Insert or replace a manifest and publish the change.
    fn put_entry(&self, scope: &ScopeId, manifest: Arc<AppletManifest>) -> ChangeKind {
        let mut state = self.write();
        let current = state
            .scopes
            .entry(scope.clone())
            .or_insert_with(empty_snapshot);

        let mut next: Vec<Arc<AppletManifest>> = current
            .iter()
            .filter(|m| m.id() != manifest.id())
            .cloned()
            .collect();
        let kind = if next.len() < current.len() {
            ChangeKind::Replaced
        } else {
            ChangeKind::Added
        };
        next.push(manifest.clone());
        next.sort_by(|a, b| a.id().cmp(b.id()));
        *current = next.into();

        self.inner.notifier.publish(&ChangeEvent {
            scope: scope.clone(),
            package_id: manifest.id().clone(),
            kind,
            manifest: Some(manifest),
        });
        kind
    }

    fn remove_entry(&self, scope: &ScopeId, id: &PackageId) -> Option<Arc<AppletManifest>> {
        let mut state = self.write();
        let current = state.scopes.get_mut(scope)?;
        let removed = current.iter().find(|m| m.id() == id).cloned()?;
        let next: Vec<Arc<AppletManifest>> =
            current.iter().filter(|m| m.id() != id).cloned().collect();
        *current = next.into();

        self.inner.notifier.publish(&ChangeEvent {
            scope: scope.clone(),
            package_id: id.clone(),
            kind: ChangeKind::Removed,
            manifest: None,
        });
        Some(removed)
    }
}

/// Decode the manifest and check that it names the same package as the
/// metadata that was verified.
fn unpack(artifact: &PackageArtifact) -> Result<AppletManifest, InstallError> {
    let manifest = artifact
        .unpack()
        .map_err(|e| InstallError::Manifest(e.to_string()))?;
    let meta = &artifact.meta;
    if manifest.id() != &meta.id || manifest.version() != &meta.version {
        return Err(InstallError::Manifest(format!(
            "manifest declares {}@{} but package metadata says {}@{}",
            manifest.id(),
            manifest.version(),
            meta.id,
            meta.version
        )));
    }
    Ok(manifest)
}

/// Read-only live view of one scope.
///
/// Reads always reflect the registry's current state; there is no way to
/// mutate the scope through the view.
#[derive(Debug, Clone)]
pub struct ScopeView {
    scope: ScopeId,
    registry: AppletRegistry,
}

impl ScopeView {
    /// The scope this view reads.
    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Current contents, ordered by id.
    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot(&self.scope)
    }

    /// Manifest installed under `id`, if any.
    pub fn get(&self, id: &PackageId) -> Option<Arc<AppletManifest>> {
        self.registry.get(&self.scope, id)
    }

    /// Whether `id` is installed.
    pub fn contains(&self, id: &PackageId) -> bool {
        self.get(id).is_some()
    }

    /// Number of installed manifests.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the scope holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to changes in this scope only.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.registry
            .inner
            .notifier
            .subscribe(Some(self.scope.clone()))
    }
}
