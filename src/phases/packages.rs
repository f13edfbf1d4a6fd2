//! Phase 4: Packages
//!
//! Packages are pinned trees fetched without history. Each one is cloned at
//! depth 1 into a scratch directory next to its destination. When the
//! instance is not the tip of that shallow clone it is fetched on its own,
//! also at depth 1. The scratch tree is checked out at the instance id,
//! stripped of `.git` and then renamed into place with a `.grove_package`
//! stamp recording the instance. A package whose stamp
//! already names the wanted instance is left alone.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::{Error, Result};
use crate::git::{CloneOptions, FetchOptions};
use crate::pool::WorkerPool;
use crate::project::{Package, PackageKey};
use crate::repository::{CheckoutTarget, VersionControl};
use crate::workspace::Workspace;

/// Counts of what a fetch pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub fetched: Vec<PackageKey>,
    pub unchanged: usize,
}

/// Instance currently installed at `dir`, if any.
pub fn installed_instance(dir: &Path) -> Option<String> {
    fs::read_to_string(dir.join(defaults::PACKAGE_STAMP))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fetches every package, skipping those already at their instance.
pub fn fetch_packages(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    packages: &BTreeMap<PackageKey, Package>,
) -> Result<PackageReport> {
    let pool = WorkerPool::new(ws.jobs);
    let results = pool.map(packages.values().collect::<Vec<_>>(), |pkg| {
        (pkg.key(), fetch_one(vcs, pkg))
    })?;
    let mut report = PackageReport::default();
    let mut failures = Vec::new();
    for (key, result) in results {
        match result {
            Ok(true) => report.fetched.push(key),
            Ok(false) => report.unchanged += 1,
            Err(e) => failures.push(Error::Project {
                project: key.name,
                message: e.to_string(),
            }),
        }
    }
    match Error::aggregate(format!("{} package(s) failed", failures.len()), failures) {
        Some(e) => Err(e),
        None => Ok(report),
    }
}

/// The instance `pkg` should be at: its pin, or the commit its version
/// currently names on the remote.
pub fn wanted_instance(vcs: &dyn VersionControl, pkg: &Package) -> Result<String> {
    if let Some(id) = &pkg.instance_id {
        return Ok(id.clone());
    }
    vcs.remote_revision(&pkg.remote, &pkg.version)?
        .ok_or_else(|| Error::Project {
            project: pkg.name.clone(),
            message: format!("{} has no ref {}", pkg.remote, pkg.version),
        })
}

fn fetch_one(vcs: &dyn VersionControl, pkg: &Package) -> Result<bool> {
    let instance = wanted_instance(vcs, pkg)?;
    if installed_instance(&pkg.path).as_deref() == Some(instance.as_str()) {
        log::debug!("package {} already at {}", pkg.name, instance);
        return Ok(false);
    }
    log::info!("fetching package {} at {}", pkg.name, instance);

    let scratch = scratch_dir(&pkg.path);
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }
    if let Some(parent) = scratch.parent() {
        fs::create_dir_all(parent)?;
    }
    let result = stage(vcs, pkg, &instance, &scratch);
    if let Err(e) = result {
        let _ = fs::remove_dir_all(&scratch);
        return Err(e);
    }

    if pkg.path.exists() {
        fs::remove_dir_all(&pkg.path)?;
    }
    fs::rename(&scratch, &pkg.path)?;
    Ok(true)
}

fn stage(vcs: &dyn VersionControl, pkg: &Package, instance: &str, scratch: &Path) -> Result<()> {
    let clone = CloneOptions {
        depth: Some(1),
        branch: (pkg.version != defaults::DEFAULT_PACKAGE_VERSION).then(|| pkg.version.clone()),
        no_checkout: true,
        ..CloneOptions::default()
    };
    vcs.clone_project(&pkg.remote, scratch, &clone)?;
    if vcs.resolve_revision(scratch, instance).is_err() {
        vcs.fetch(
            scratch,
            &FetchOptions {
                refspec: Some(instance.to_string()),
                depth: Some(1),
                ..FetchOptions::default()
            },
        )?;
    }
    vcs.checkout(scratch, &CheckoutTarget::Revision(instance.to_string()))?;
    fs::remove_dir_all(scratch.join(".git"))?;
    fs::write(scratch.join(defaults::PACKAGE_STAMP), format!("{}\n", instance))?;
    Ok(())
}

fn scratch_dir(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "package".to_string());
    path.with_file_name(format!(".{}.grove-tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::RecordingVcs;

    fn setup() -> (tempfile::TempDir, Workspace, RecordingVcs) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path()).with_jobs(2);
        let vcs = RecordingVcs::new();
        vcs.set_remote_ref("https://example.com/sdk", "main", "sdk-1");
        vcs.set_remote_ref("https://example.com/sdk", "HEAD", "sdk-1");
        vcs.set_remote_ref("https://example.com/sdk", "v2", "sdk-2");
        (dir, ws, vcs)
    }

    fn sdk(ws: &Workspace, instance: Option<&str>) -> BTreeMap<PackageKey, Package> {
        let pkg = Package {
            name: "sdk".to_string(),
            remote: "https://example.com/sdk".to_string(),
            path: ws.root.join("prebuilt/sdk"),
            version: defaults::DEFAULT_PACKAGE_VERSION.to_string(),
            instance_id: instance.map(str::to_string),
        };
        BTreeMap::from([(pkg.key(), pkg)])
    }

    #[test]
    fn test_fetch_writes_stamp_without_git_dir() {
        let (_dir, ws, vcs) = setup();
        let report = fetch_packages(&ws, &vcs, &sdk(&ws, Some("sdk-2"))).unwrap();
        assert_eq!(report.fetched.len(), 1);
        let path = ws.root.join("prebuilt/sdk");
        assert_eq!(installed_instance(&path).as_deref(), Some("sdk-2"));
        assert!(!path.join(".git").exists());
        assert!(!ws.root.join("prebuilt/.sdk.grove-tmp").exists());

        let clones: Vec<String> = vcs
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("clone"))
            .collect();
        assert_eq!(clones.len(), 1);
        assert!(clones[0].ends_with("--depth 1"), "{}", clones[0]);
    }

    #[test]
    fn test_versioned_package_clones_its_branch_shallowly() {
        let (_dir, ws, vcs) = setup();
        let mut packages = sdk(&ws, None);
        for pkg in packages.values_mut() {
            pkg.version = "v2".to_string();
        }
        fetch_packages(&ws, &vcs, &packages).unwrap();
        assert_eq!(
            installed_instance(&ws.root.join("prebuilt/sdk")).as_deref(),
            Some("sdk-2")
        );
        assert!(vcs
            .calls()
            .iter()
            .any(|c| c.starts_with("clone") && c.ends_with("--depth 1")));
    }

    #[test]
    fn test_unchanged_package_is_skipped() {
        let (_dir, ws, vcs) = setup();
        let packages = sdk(&ws, Some("sdk-2"));
        fetch_packages(&ws, &vcs, &packages).unwrap();
        vcs.clear_calls();
        let report = fetch_packages(&ws, &vcs, &packages).unwrap();
        assert_eq!(report.unchanged, 1);
        assert!(vcs.mutating_calls().is_empty());
    }

    #[test]
    fn test_unpinned_package_follows_version() {
        let (_dir, ws, vcs) = setup();
        fetch_packages(&ws, &vcs, &sdk(&ws, None)).unwrap();
        assert_eq!(
            installed_instance(&ws.root.join("prebuilt/sdk")).as_deref(),
            Some("sdk-1")
        );
    }

    #[test]
    fn test_unknown_remote_fails() {
        let (_dir, ws, vcs) = setup();
        let mut packages = sdk(&ws, None);
        for pkg in packages.values_mut() {
            pkg.remote = "https://example.com/missing".to_string();
        }
        assert!(fetch_packages(&ws, &vcs, &packages).is_err());
    }
}
