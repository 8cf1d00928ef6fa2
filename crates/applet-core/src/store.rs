//! On-disk package store.
//!
//! Layout:
//!
//! ```text
//! {applet_dir}/
//! ├── {id}.pak              # global-scope applets
//! ├── {solution}.sln.pak    # solution envelopes
//! └── {solution}/
//!     └── {id}.pak          # applets in a solution's private scope
//! ```
//!
//! The store is stateless apart from its root path. Callers serialize writes.

use applet_schema::{APPLET_EXTENSION, PackageId, SOLUTION_SUFFIX, ScopeId};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from reading or writing the applet directory.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The id would escape the applet directory or is otherwise unusable.
    #[error("'{0}' cannot be used as a file name")]
    InvalidName(String),

    /// The target exists and the write was not an upgrade.
    #[error("{} already exists and overwrite was not authorized", .0.display())]
    Exists(PathBuf),

    /// A filesystem operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Package files found by [`PackageStore::scan`], solutions first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// `*.sln.pak` envelopes at the store root, sorted by path.
    pub solutions: Vec<PathBuf>,
    /// Standalone `*.pak` applets at the store root, sorted by path.
    pub applets: Vec<PathBuf>,
}

/// Persists package artifacts under a single applet directory.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    /// Store rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The applet directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a scope's applets; the global scope is the root.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] if the scope id is not a safe
    /// directory name.
    pub fn scope_dir(&self, scope: &ScopeId) -> Result<PathBuf, StoreError> {
        if scope.is_global() {
            return Ok(self.root.clone());
        }
        let name = PackageId::new(scope.as_str());
        if !name.is_path_safe() {
            return Err(StoreError::InvalidName(scope.as_str().to_string()));
        }
        Ok(self.root.join(scope.as_str()))
    }

    /// Path of an applet file within a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for ids or scopes that would escape
    /// the applet directory.
    pub fn applet_path(&self, scope: &ScopeId, id: &PackageId) -> Result<PathBuf, StoreError> {
        check_name(id)?;
        Ok(self
            .scope_dir(scope)?
            .join(format!("{id}.{APPLET_EXTENSION}")))
    }

    /// Path of a solution envelope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for unsafe ids.
    pub fn solution_path(&self, id: &PackageId) -> Result<PathBuf, StoreError> {
        check_name(id)?;
        Ok(self.root.join(format!("{id}{SOLUTION_SUFFIX}")))
    }

    /// Write an applet into `scope`, returning its path.
    ///
    /// An existing file is replaced only when `overwrite` is set.
    ///
    /// # Errors
    ///
    /// Returns an error for unsafe names, an unauthorized overwrite, or I/O failure.
    pub fn persist(
        &self,
        scope: &ScopeId,
        id: &PackageId,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<PathBuf, StoreError> {
        let path = self.applet_path(scope, id)?;
        write_atomic(&path, bytes, overwrite)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "persisted applet");
        Ok(path)
    }

    /// Write a solution envelope, returning its path.
    ///
    /// # Errors
    ///
    /// Returns an error for unsafe names, an unauthorized overwrite, or I/O failure.
    pub fn persist_solution(
        &self,
        id: &PackageId,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<PathBuf, StoreError> {
        let path = self.solution_path(id)?;
        write_atomic(&path, bytes, overwrite)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "persisted solution");
        Ok(path)
    }

    /// Read back raw artifact bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn load(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        fs::read(path).map_err(|e| StoreError::io(path, e))
    }

    /// Remove an artifact. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for failures other than "not found".
    pub fn delete(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "deleted artifact");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Remove a private scope's directory and anything left in it.
    /// The global scope is never removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error for failures other than "not found".
    pub fn remove_scope_dir(&self, scope: &ScopeId) -> Result<(), StoreError> {
        if scope.is_global() {
            return Ok(());
        }
        let dir = self.scope_dir(scope)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }

    /// List package files at the store root. A missing root is treated as empty.
    ///
    /// Private scope directories are not descended into; their contents are
    /// reproduced by re-installing the owning solution.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root exists but cannot be read.
    pub fn scan(&self) -> Result<ScanResult, StoreError> {
        let mut result = ScanResult::default();
        if !self.root.exists() {
            return Ok(result);
        }

        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed"));
                StoreError::io(&self.root, source)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(SOLUTION_SUFFIX) {
                result.solutions.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext == APPLET_EXTENSION)
            {
                result.applets.push(path);
            }
        }

        Ok(result)
    }
}

fn check_name(id: &PackageId) -> Result<(), StoreError> {
    if id.is_path_safe() {
        Ok(())
    } else {
        Err(StoreError::InvalidName(id.to_string()))
    }
}

/// Write to a temp file in the target directory, then rename into place so a
/// reader never observes a partially written artifact.
fn write_atomic(path: &Path, bytes: &[u8], overwrite: bool) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidName(path.display().to_string()))?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    if !overwrite && path.exists() {
        return Err(StoreError::Exists(path.to_path_buf()));
    }

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            StoreError::Exists(path.to_path_buf())
        } else {
            StoreError::io(path, e.error)
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, PackageStore) {
        let dir = TempDir::new().unwrap();
        let store = PackageStore::new(dir.path().join("applets"));
        (dir, store)
    }

    #[test]
    fn test_layout() {
        let (_dir, store) = store();
        let id = PackageId::new("org.example");
        let sln = PackageId::new("sln");

        assert_eq!(
            store.applet_path(&ScopeId::GLOBAL, &id).unwrap(),
            store.root().join("org.example.pak")
        );
        assert_eq!(
            store.applet_path(&ScopeId::solution(&sln), &id).unwrap(),
            store.root().join("sln").join("org.example.pak")
        );
        assert_eq!(
            store.solution_path(&sln).unwrap(),
            store.root().join("sln.sln.pak")
        );
    }

    #[test]
    fn test_persist_creates_dirs_and_loads_back() {
        let (_dir, store) = store();
        let scope = ScopeId::from("sln");
        let path = store
            .persist(&scope, &PackageId::new("a"), b"bytes", false)
            .unwrap();
        assert!(path.exists());
        assert_eq!(store.load(&path).unwrap(), b"bytes");
    }

    #[test]
    fn test_overwrite_requires_authorization() {
        let (_dir, store) = store();
        let id = PackageId::new("a");
        store.persist(&ScopeId::GLOBAL, &id, b"v1", false).unwrap();

        let err = store
            .persist(&ScopeId::GLOBAL, &id, b"v2", false)
            .unwrap_err();
        assert!(matches!(err, StoreError::Exists(_)));

        let path = store.persist(&ScopeId::GLOBAL, &id, b"v2", true).unwrap();
        assert_eq!(store.load(&path).unwrap(), b"v2");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store) = store();
        let path = store
            .persist(&ScopeId::GLOBAL, &PackageId::new("a"), b"x", false)
            .unwrap();
        store.delete(&path).unwrap();
        assert!(!path.exists());
        store.delete(&path).unwrap();
    }

    #[test]
    fn test_rejects_escaping_names() {
        let (_dir, store) = store();
        let err = store
            .persist(&ScopeId::GLOBAL, &PackageId::new("../evil"), b"x", false)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)));
        assert!(store.scope_dir(&ScopeId::from("..")).is_err());
    }

    #[test]
    fn test_scan_orders_solutions_first() {
        let (_dir, store) = store();
        assert_eq!(store.scan().unwrap(), ScanResult::default());

        store
            .persist(&ScopeId::GLOBAL, &PackageId::new("b"), b"x", false)
            .unwrap();
        store
            .persist(&ScopeId::GLOBAL, &PackageId::new("a"), b"x", false)
            .unwrap();
        store
            .persist_solution(&PackageId::new("s"), b"x", false)
            .unwrap();
        store
            .persist(&ScopeId::from("s"), &PackageId::new("nested"), b"x", false)
            .unwrap();
        fs::write(store.root().join("notes.txt"), b"ignored").unwrap();

        let scan = store.scan().unwrap();
        assert_eq!(scan.solutions, vec![store.root().join("s.sln.pak")]);
        assert_eq!(
            scan.applets,
            vec![store.root().join("a.pak"), store.root().join("b.pak")]
        );
    }

    #[test]
    fn test_remove_scope_dir() {
        let (_dir, store) = store();
        let scope = ScopeId::from("s");
        store
            .persist(&scope, &PackageId::new("a"), b"x", false)
            .unwrap();
        store.remove_scope_dir(&scope).unwrap();
        assert!(!store.root().join("s").exists());
        store.remove_scope_dir(&scope).unwrap();
        store.remove_scope_dir(&ScopeId::GLOBAL).unwrap();
        assert!(store.root().exists());
    }
}
