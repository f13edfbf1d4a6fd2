//! # Lockfiles
//!
//! A lockfile pins every project and package reachable from a set of
//! manifests to an exact revision (or package instance). It is written as a
//! pretty-printed JSON array, projects first, each group sorted by key, with
//! a trailing newline, so the same inputs always produce byte-identical
//! output:
//!
//! ```json
//! [
//!   {
//!     "name": "a",
//!     "remote": "https://example.com/a",
//!     "revision": "4e1f0c2..."
//!   },
//!   {
//!     "package": "toolchain",
//!     "remote": "https://example.com/toolchain",
//!     "instance_id": "9b7a51d..."
//!   }
//! ]
//! ```
//!
//! A `grove.lock` placed next to a manifest pins the unpinned projects and
//! packages of that manifest's subtree during resolution.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::phases::resolve::{ManifestResolver, ResolveOptions};
use crate::project::{PackageKey, ProjectKey};
use crate::repository::VersionControl;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectLock {
    pub name: String,
    pub remote: String,
    pub revision: String,
}

impl ProjectLock {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.name, &self.remote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageLock {
    pub package: String,
    pub remote: String,
    pub instance_id: String,
}

impl PackageLock {
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.package.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum LockEntry {
    Project(ProjectLock),
    Package(PackageLock),
}

/// A set of pins keyed by project and package identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockFile {
    pub projects: BTreeMap<ProjectKey, ProjectLock>,
    pub packages: BTreeMap<PackageKey, PackageLock>,
}

/// Options for generating a lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub enable_projects: bool,
    pub enable_packages: bool,
    /// Let later inputs silently win when two inputs disagree.
    pub ignore_conflicts: bool,
    /// Read import checkouts as they are on disk instead of fetching.
    pub local_manifest: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            enable_projects: false,
            enable_packages: true,
            ignore_conflicts: false,
            local_manifest: false,
        }
    }
}

impl LockFile {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.packages.is_empty()
    }

    pub fn parse(content: &str, origin: &Path) -> Result<LockFile> {
        let entries: Vec<LockEntry> =
            serde_json::from_str(content).map_err(|e| Error::ManifestParse {
                path: origin.display().to_string(),
                message: format!("invalid lockfile: {}", e),
                hint: None,
            })?;
        let mut lock = LockFile::default();
        for entry in entries {
            match entry {
                LockEntry::Project(p) => {
                    lock.projects.insert(p.key(), p);
                }
                LockEntry::Package(p) => {
                    lock.packages.insert(p.key(), p);
                }
            }
        }
        Ok(lock)
    }

    pub fn from_file(path: &Path) -> Result<LockFile> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Deterministic serialization: projects then packages, each sorted by
    /// key, pretty-printed, newline-terminated.
    pub fn to_json(&self) -> Result<String> {
        let entries: Vec<LockEntry> = self
            .projects
            .values()
            .cloned()
            .map(LockEntry::Project)
            .chain(self.packages.values().cloned().map(LockEntry::Package))
            .collect();
        let mut json = serde_json::to_string_pretty(&entries)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes to `path`, or to stdout when `path` is `-`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if path == Path::new("-") {
            let mut out = std::io::stdout().lock();
            out.write_all(json.as_bytes())?;
            out.flush()?;
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }
}

/// Accumulates pins from several inputs, detecting disagreements.
#[derive(Debug, Default)]
pub struct LockBuilder {
    lock: LockFile,
    project_sources: HashMap<ProjectKey, String>,
    package_sources: HashMap<PackageKey, String>,
    ignore_conflicts: bool,
}

impl LockBuilder {
    pub fn new(ignore_conflicts: bool) -> Self {
        Self {
            ignore_conflicts,
            ..Self::default()
        }
    }

    pub fn add_project(&mut self, entry: ProjectLock, source: &str) -> Result<()> {
        let key = entry.key();
        if let Some(existing) = self.lock.projects.get(&key) {
            if existing.revision != entry.revision {
                let first_source = self.project_sources.get(&key).cloned().unwrap_or_default();
                if !self.ignore_conflicts {
                    return Err(Error::LockConflict {
                        key: key.to_string(),
                        first: existing.revision.clone(),
                        first_source,
                        second: entry.revision,
                        second_source: source.to_string(),
                    });
                }
                log::debug!(
                    "{}: {} from {} replaces {} from {}",
                    key,
                    entry.revision,
                    source,
                    existing.revision,
                    first_source
                );
            }
        }
        self.project_sources.insert(key.clone(), source.to_string());
        self.lock.projects.insert(key, entry);
        Ok(())
    }

    pub fn add_package(&mut self, entry: PackageLock, source: &str) -> Result<()> {
        let key = entry.key();
        if let Some(existing) = self.lock.packages.get(&key) {
            if existing.instance_id != entry.instance_id || existing.remote != entry.remote {
                let first_source = self.package_sources.get(&key).cloned().unwrap_or_default();
                if !self.ignore_conflicts {
                    return Err(Error::LockConflict {
                        key: key.to_string(),
                        first: existing.instance_id.clone(),
                        first_source,
                        second: entry.instance_id,
                        second_source: source.to_string(),
                    });
                }
            }
        }
        self.package_sources.insert(key.clone(), source.to_string());
        self.lock.packages.insert(key, entry);
        Ok(())
    }

    pub fn finish(self) -> LockFile {
        self.lock
    }
}

/// Resolves each manifest in `manifests` and pins everything it reaches.
///
/// Projects without a pinned revision are pinned to the current tip of their
/// branch on the remote; packages without an instance id to the commit their
/// version names.
pub fn generate(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    manifests: &[PathBuf],
    opts: &LockOptions,
) -> Result<LockFile> {
    let mut builder = LockBuilder::new(opts.ignore_conflicts);
    let mut remote_refs: HashMap<(String, String), String> = HashMap::new();
    let mut lookup = |remote: &str, reference: &str| -> Result<String> {
        let key = (remote.to_string(), reference.to_string());
        if let Some(rev) = remote_refs.get(&key) {
            return Ok(rev.clone());
        }
        let rev = vcs
            .remote_revision(remote, reference)?
            .ok_or_else(|| Error::Project {
                project: remote.to_string(),
                message: format!("reference {} not found on remote", reference),
            })?;
        remote_refs.insert(key, rev.clone());
        Ok(rev)
    };

    for manifest in manifests {
        let source = manifest.display().to_string();
        let resolve_opts = ResolveOptions {
            local_manifest: opts.local_manifest,
            use_lockfiles: false,
            ignore_lock_conflicts: opts.ignore_conflicts,
        };
        let resolved = ManifestResolver::new(ws, vcs, resolve_opts).resolve(&[manifest.clone()])?;

        if opts.enable_projects {
            for project in resolved.projects.values() {
                let revision = match &project.revision {
                    Some(rev) => rev.clone(),
                    None => lookup(
                        &project.remote,
                        &format!("refs/heads/{}", project.remote_branch),
                    )?,
                };
                builder.add_project(
                    ProjectLock {
                        name: project.name.clone(),
                        remote: project.remote.clone(),
                        revision,
                    },
                    &source,
                )?;
            }
        }
        if opts.enable_packages {
            for package in resolved.packages.values() {
                let instance_id = match &package.instance_id {
                    Some(id) => id.clone(),
                    None => lookup(&package.remote, &package.version)?,
                };
                builder.add_package(
                    PackageLock {
                        package: package.name.clone(),
                        remote: package.remote.clone(),
                        instance_id,
                    },
                    &source,
                )?;
            }
        }
    }
    Ok(builder.finish())
}
