//! Dependency checks between installed manifests.
//!
//! Dependencies are minimum-version constraints on package ids within one
//! scope. Installs consult [`check_dependencies`], removals consult
//! [`check_safe_to_remove`], and batches are ordered by [`install_order`].

use applet_schema::{AppletManifest, DependencyRef, PackageId, PackageMetadata};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Returns every dependency of `meta` that no manifest in `installed`
/// satisfies.
///
/// A dependency is satisfied by a manifest with the same id whose version is
/// greater than or equal to the required one (dotted-numeric comparison).
///
/// # Errors
///
/// Returns the unsatisfied dependencies, in declaration order.
pub fn check_dependencies(
    meta: &PackageMetadata,
    installed: &[Arc<AppletManifest>],
) -> Result<(), Vec<DependencyRef>> {
    let missing: Vec<DependencyRef> = meta
        .dependencies
        .iter()
        .filter(|dep| {
            !installed
                .iter()
                .any(|m| m.id() == &dep.id && m.version().satisfies(&dep.version))
        })
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

/// Checks whether `id` can be removed from a scope without breaking any
/// other installed manifest.
///
/// # Errors
///
/// Returns the ids of every other manifest that declares a dependency on `id`.
pub fn check_safe_to_remove(
    id: &PackageId,
    installed: &[Arc<AppletManifest>],
) -> Result<(), Vec<PackageId>> {
    let mut blocking: Vec<PackageId> = installed
        .iter()
        .filter(|m| m.id() != id && m.depends_on(id))
        .map(|m| m.id().clone())
        .collect();

    if blocking.is_empty() {
        Ok(())
    } else {
        blocking.sort();
        blocking.dedup();
        Err(blocking)
    }
}

/// Orders a batch of packages so that each one comes after the packages in
/// the batch it depends on. Returns indices into `batch`.
///
/// Uses Kahn's algorithm; ties keep their original relative order.
/// Dependencies on packages outside the batch are ignored. Members of a
/// cycle are appended in original order once nothing else can be placed,
/// leaving the per-package dependency check to report them.
pub fn install_order(batch: &[&PackageMetadata]) -> Vec<usize> {
    let position: HashMap<&PackageId, usize> = batch
        .iter()
        .enumerate()
        .map(|(i, meta)| (&meta.id, i))
        .collect();

    let mut in_degree = vec![0usize; batch.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); batch.len()];
    for (i, meta) in batch.iter().enumerate() {
        for dep in &meta.dependencies {
            match position.get(&dep.id) {
                Some(&j) if j != i => {
                    dependents[j].push(i);
                    in_degree[i] += 1;
                }
                _ => {}
            }
        }
    }

    let mut order = Vec::with_capacity(batch.len());
    let mut placed = vec![false; batch.len()];
    let mut queue: VecDeque<usize> = (0..batch.len()).filter(|&i| in_degree[i] == 0).collect();

    while let Some(u) = queue.pop_front() {
        order.push(u);
        placed[u] = true;
        let mut ready = Vec::new();
        for &v in &dependents[u] {
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                ready.push(v);
            }
        }
        ready.sort_unstable();
        queue.extend(ready);
    }

    if order.len() < batch.len() {
        let cyclic: Vec<usize> = (0..batch.len()).filter(|&i| !placed[i]).collect();
        tracing::warn!(
            packages = ?cyclic.iter().map(|&i| batch[i].id.as_str()).collect::<Vec<_>>(),
            "circular dependency in package batch"
        );
        order.extend(cyclic);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use applet_schema::{AppletInfo, AppletVersion, ContentHash, Thumbprint};

    fn manifest(id: &str, version: &str, deps: Vec<DependencyRef>) -> Arc<AppletManifest> {
        Arc::new(AppletManifest {
            info: AppletInfo {
                id: id.into(),
                version: AppletVersion::new(version),
                name: None,
                author: None,
                dependencies: deps,
            },
            templates: vec![],
        })
    }

    fn meta(deps: Vec<DependencyRef>) -> PackageMetadata {
        PackageMetadata {
            id: "pkg".into(),
            version: AppletVersion::new("1.0"),
            author: String::new(),
            content_hash: ContentHash::default(),
            signature: None,
            public_key_token: Thumbprint::default(),
            dependencies: deps,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_all_satisfied() {
        let installed = vec![manifest("a", "1.2", vec![]), manifest("b", "3.0.1", vec![])];
        let m = meta(vec![
            DependencyRef::new("a", "1.2.0"),
            DependencyRef::new("b", "3"),
        ]);
        assert!(check_dependencies(&m, &installed).is_ok());
    }

    #[test]
    fn test_missing_and_too_old() {
        let installed = vec![manifest("a", "1.1.9", vec![])];
        let m = meta(vec![
            DependencyRef::new("a", "1.2"),
            DependencyRef::new("b", ""),
        ]);
        let missing = check_dependencies(&m, &installed).unwrap_err();
        assert_eq!(
            missing,
            vec![DependencyRef::new("a", "1.2"), DependencyRef::new("b", "")]
        );
    }

    #[test]
    fn test_any_version_constraint() {
        let installed = vec![manifest("a", "0.0.1", vec![])];
        let m = meta(vec![DependencyRef::new("a", "")]);
        assert!(check_dependencies(&m, &installed).is_ok());
    }

    #[test]
    fn test_removal_blocked_by_dependents() {
        let installed = vec![
            manifest("base", "1.0", vec![]),
            manifest("x", "1.0", vec![DependencyRef::new("base", "1.0")]),
            manifest("w", "1.0", vec![DependencyRef::new("base", "")]),
            manifest("y", "1.0", vec![]),
        ];
        assert_eq!(
            check_safe_to_remove(&"base".into(), &installed),
            Err(vec![PackageId::new("w"), PackageId::new("x")])
        );
        assert!(check_safe_to_remove(&"x".into(), &installed).is_ok());
    }

    #[test]
    fn test_self_reference_does_not_block() {
        let installed = vec![manifest("a", "1.0", vec![DependencyRef::new("a", "")])];
        assert!(check_safe_to_remove(&"a".into(), &installed).is_ok());
    }

    fn meta_named(id: &str, deps: &[&str]) -> PackageMetadata {
        let mut m = meta(deps.iter().map(|d| DependencyRef::new(d, "")).collect());
        m.id = id.into();
        m
    }

    #[test]
    fn test_install_order_places_dependencies_first() {
        let ui = meta_named("ui", &["core", "net"]);
        let net = meta_named("net", &["core"]);
        let core = meta_named("core", &[]);
        let extra = meta_named("extra", &["outside"]);
        let batch = [&ui, &net, &core, &extra];
        let order: Vec<&str> = install_order(&batch)
            .into_iter()
            .map(|i| batch[i].id.as_str())
            .collect();
        assert_eq!(order, vec!["core", "extra", "net", "ui"]);
    }

    #[test]
    fn test_install_order_keeps_cycles() {
        let a = meta_named("a", &["b"]);
        let b = meta_named("b", &["a"]);
        let c = meta_named("c", &[]);
        let batch = [&a, &b, &c];
        assert_eq!(install_order(&batch), vec![2, 0, 1]);
    }
}
