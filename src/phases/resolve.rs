//! Phase 1: Manifest Resolution
//!
//! Expands an import graph into a single [`ResolvedSet`].
//!
//! ## Process
//!
//! The resolver walks the graph depth-first starting at each entry manifest.
//! For every manifest it:
//!
//! 1. Resolves each remote import, checking out (or refreshing) the import's
//!    repository first, then each local import.
//! 2. Merges the children as siblings: two siblings declaring the same key
//!    with different attributes is a [`Error::KeyConflict`], unless the
//!    manifest declares that key itself.
//! 3. Lets the manifest's own entries override anything it imported. Within
//!    one file the last duplicate wins, with a warning.
//! 4. Registers a `grove.lock` found next to the manifest.
//!
//! A manifest reached twice (a diamond) is resolved once. Later visits reuse
//! the first result, so every path to it still contributes its entries to
//! the sibling merge. Reaching a manifest that is still on the traversal
//! stack is an [`Error::ImportCycle`].
//!
//! After the walk, lockfile pins are applied to unpinned entries, checkout
//! paths are checked for collisions and hooks are bound to their projects.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::{Path, PathBuf};

use super::{ImportNode, ResolvedSet};
use crate::defaults;
use crate::error::{Error, Result};
use crate::git::{self, CloneOptions, FetchOptions};
use crate::lockfile::{LockBuilder, LockFile};
use crate::manifest::{Import, Manifest};
use crate::project::{self, Hook, Package, PackageKey, Project, ProjectKey};
use crate::repository::{CheckoutTarget, VersionControl};
use crate::workspace::Workspace;

/// Options controlling resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Read existing import checkouts as they are instead of fetching.
    pub local_manifest: bool,
    /// Honor `grove.lock` files next to manifests.
    pub use_lockfiles: bool,
    /// Let the later lockfile win when two disagree.
    pub ignore_lock_conflicts: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            local_manifest: false,
            use_lockfiles: true,
            ignore_lock_conflicts: false,
        }
    }
}

/// Entries contributed by one subtree, each tagged with the manifest that
/// declared it.
#[derive(Debug, Default, Clone)]
struct Contribution {
    projects: BTreeMap<ProjectKey, (Project, String)>,
    packages: BTreeMap<PackageKey, (Package, String)>,
    hooks: BTreeMap<String, (Hook, String)>,
}

impl Contribution {
    /// Entries declared directly by `manifest`, anchored at `base`.
    fn from_manifest(manifest: &Manifest, origin: &str, base: &Path, root: &Path) -> Self {
        let mut own = Contribution::default();
        for p in &manifest.projects {
            let mut project = p.clone();
            project.path = base.join(&p.path);
            project.githooks = p.githooks.as_ref().map(|h| root.join(h));
            let key = project.key();
            if own
                .projects
                .insert(key.clone(), (project, origin.to_string()))
                .is_some()
            {
                log::warn!("{} is declared twice in {}; the last entry wins", key, origin);
            }
        }
        for p in &manifest.packages {
            let mut package = p.clone();
            package.path = base.join(&p.path);
            let key = package.key();
            if own
                .packages
                .insert(key.clone(), (package, origin.to_string()))
                .is_some()
            {
                log::warn!("package {} is declared twice in {}; the last entry wins", key, origin);
            }
        }
        for h in &manifest.hooks {
            let key = h.to_string();
            if own
                .hooks
                .insert(key.clone(), (h.clone(), origin.to_string()))
                .is_some()
            {
                log::warn!("hook {} is declared twice in {}; the last entry wins", key, origin);
            }
        }
        own
    }

    fn merge_sibling(&mut self, other: Contribution) -> Result<()> {
        self.merge_sibling_under(other, &Contribution::default())
    }

    /// Merges a sibling, ignoring disagreements on keys `parent` declares
    /// itself since the parent's entries replace both sides anyway.
    fn merge_sibling_under(&mut self, other: Contribution, parent: &Contribution) -> Result<()> {
        merge_map(&mut self.projects, other.projects, &parent.projects)?;
        merge_map(&mut self.packages, other.packages, &parent.packages)?;
        merge_map(&mut self.hooks, other.hooks, &parent.hooks)?;
        Ok(())
    }

    fn override_with(&mut self, own: Contribution) {
        self.projects.extend(own.projects);
        self.packages.extend(own.packages);
        self.hooks.extend(own.hooks);
    }
}

fn merge_map<K, V>(
    into: &mut BTreeMap<K, (V, String)>,
    from: BTreeMap<K, (V, String)>,
    shadowed: &BTreeMap<K, (V, String)>,
) -> Result<()>
where
    K: Ord + Display,
    V: PartialEq,
{
    for (key, (value, origin)) in from {
        match into.get(&key) {
            Some((existing, existing_origin))
                if *existing != value && !shadowed.contains_key(&key) =>
            {
                return Err(Error::KeyConflict {
                    key: key.to_string(),
                    message: format!(
                        "declared differently in {} and {}",
                        existing_origin, origin
                    ),
                });
            }
            Some(_) => {}
            None => {
                into.insert(key, (value, origin));
            }
        }
    }
    Ok(())
}

/// Resolves manifest import graphs for one workspace.
pub struct ManifestResolver<'a> {
    ws: &'a Workspace,
    vcs: &'a dyn VersionControl,
    opts: ResolveOptions,
    stack: Vec<String>,
    done: HashMap<String, Contribution>,
    locks: LockBuilder,
    touched: Vec<PathBuf>,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(ws: &'a Workspace, vcs: &'a dyn VersionControl, opts: ResolveOptions) -> Self {
        Self {
            ws,
            vcs,
            opts,
            stack: Vec::new(),
            done: HashMap::new(),
            locks: LockBuilder::new(opts.ignore_lock_conflicts),
            touched: Vec::new(),
        }
    }

    /// Resolves the graphs rooted at `entries` into one set. Entry manifests
    /// are siblings of each other.
    pub fn resolve(mut self, entries: &[PathBuf]) -> Result<ResolvedSet> {
        let mut total = Contribution::default();
        let mut imports = Vec::new();
        for entry in entries {
            let id = self.local_id(entry)?;
            let (contribution, node) = self.resolve_file(entry, id, Path::new(""))?;
            total.merge_sibling(contribution)?;
            imports.push(node);
        }

        let locks = self.locks.finish();
        let mut projects: BTreeMap<ProjectKey, Project> = total
            .projects
            .into_iter()
            .map(|(k, (p, _))| (k, p))
            .collect();
        let mut packages: BTreeMap<PackageKey, Package> = total
            .packages
            .into_iter()
            .map(|(k, (p, _))| (k, p))
            .collect();
        apply_locks(&locks, &mut projects, &mut packages);
        check_paths(&projects, &packages)?;
        let hooks = bind_hooks(total.hooks, &projects)?;

        Ok(ResolvedSet {
            projects,
            hooks,
            packages,
            imports,
            import_checkouts: self.touched,
        })
    }

    fn local_id(&self, path: &Path) -> Result<String> {
        let canonical = path.canonicalize().map_err(|e| Error::ManifestParse {
            path: path.display().to_string(),
            message: format!("cannot read manifest: {}", e),
            hint: None,
        })?;
        Ok(canonical.display().to_string())
    }

    fn label(&self, path: &Path) -> String {
        path.strip_prefix(&self.ws.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn resolve_file(
        &mut self,
        path: &Path,
        id: String,
        prefix: &Path,
    ) -> Result<(Contribution, ImportNode)> {
        let id = if prefix.as_os_str().is_empty() {
            id
        } else {
            format!("{} under {}", id, prefix.display())
        };
        if let Some(pos) = self.stack.iter().position(|s| *s == id) {
            let mut cycle: Vec<String> = self.stack[pos..].to_vec();
            cycle.push(id);
            return Err(Error::ImportCycle {
                cycle: cycle.join(" -> "),
            });
        }
        if let Some(contribution) = self.done.get(&id) {
            log::debug!("{} already resolved", id);
            let mut node = ImportNode::new(self.label(path));
            node.repeated = true;
            return Ok((contribution.clone(), node));
        }

        self.stack.push(id.clone());
        let result = self.resolve_manifest(path, prefix);
        self.stack.pop();
        let (contribution, node) = result?;
        self.done.insert(id, contribution.clone());
        Ok((contribution, node))
    }

    fn resolve_manifest(&mut self, path: &Path, prefix: &Path) -> Result<(Contribution, ImportNode)> {
        let manifest = Manifest::from_file(path)?;
        let origin = self.label(path);
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut node = ImportNode::new(origin.clone());
        let base = self.ws.root.join(prefix);
        let own = Contribution::from_manifest(&manifest, &origin, &base, &self.ws.root);
        let mut imported = Contribution::default();

        for import in &manifest.imports {
            let child_prefix = match &import.root {
                Some(r) => prefix.join(r),
                None => prefix.to_path_buf(),
            };
            let project = self.import_project(import, prefix);
            self.ensure_import_checkout(&project)?;
            let child_path = project.path.join(&import.manifest);
            let child_id = format!(
                "{}:{}@{}",
                git::normalize_remote(&import.remote),
                import.manifest.display(),
                import.revision.as_deref().unwrap_or(&import.remote_branch)
            );
            let (mut child, child_node) = self.resolve_file(&child_path, child_id, &child_prefix)?;
            child
                .projects
                .entry(project.key())
                .or_insert((project, origin.clone()));
            imported.merge_sibling_under(child, &own)?;
            node.add_child(child_node);
        }

        for local in &manifest.localimports {
            let child_path = dir.join(&local.file);
            let child_id = self.local_id(&child_path).map_err(|_| Error::ManifestParse {
                path: origin.clone(),
                message: format!("local import {} not found", local.file.display()),
                hint: Some("localimport paths are relative to the importing manifest".to_string()),
            })?;
            let (child, child_node) = self.resolve_file(&child_path, child_id, prefix)?;
            imported.merge_sibling_under(child, &own)?;
            node.add_child(child_node);
        }

        imported.override_with(own);

        if self.opts.use_lockfiles {
            let lock_path = dir.join(defaults::LOCKFILE_NAME);
            if lock_path.is_file() {
                let lock = LockFile::from_file(&lock_path)?;
                let source = self.label(&lock_path);
                for entry in lock.projects.into_values() {
                    self.locks.add_project(entry, &source)?;
                }
                for entry in lock.packages.into_values() {
                    self.locks.add_package(entry, &source)?;
                }
            }
        }
        Ok((imported, node))
    }

    fn import_project(&self, import: &Import, prefix: &Path) -> Project {
        let mut project = import.to_project();
        project.path = self.ws.root.join(prefix).join(import.checkout_path());
        project
    }

    /// Makes sure the import repository is checked out and, unless reading
    /// manifests locally, at the revision the import asks for.
    fn ensure_import_checkout(&mut self, project: &Project) -> Result<()> {
        let path = &project.path;

        if !path.join(".git").exists() {
            if path.exists() && path.read_dir()?.next().is_some() {
                return Err(Error::Project {
                    project: project.name.clone(),
                    message: format!(
                        "{} exists but is not a git checkout",
                        path.display()
                    ),
                });
            }
            log::info!("cloning manifest repository {}", project.remote);
            let opts = CloneOptions {
                branch: (!project.is_pinned()).then(|| project.remote_branch.clone()),
                ..CloneOptions::default()
            };
            self.vcs.clone_project(&project.remote, path, &opts)?;
            if project.is_pinned() {
                self.vcs.checkout(path, &project.checkout_target())?;
            }
            project::write_metadata(project, &self.ws.root)?;
            self.touched.push(path.clone());
            return Ok(());
        }

        if !project::metadata_file(path).is_file() {
            project::write_metadata(project, &self.ws.root)?;
        }
        self.touched.push(path.clone());
        if self.opts.local_manifest {
            return Ok(());
        }
        if self.vcs.has_uncommitted_changes(path)? {
            log::warn!(
                "{} has local changes; reading its manifests as they are",
                path.display()
            );
            return Ok(());
        }
        self.vcs.fetch(path, &FetchOptions::default())?;
        match project.checkout_target() {
            target @ CheckoutTarget::Revision(_) => self.vcs.checkout(path, &target)?,
            CheckoutTarget::Branch(branch) => match self.vcs.current_branch(path)? {
                Some(current) if current == branch => {
                    self.vcs.fast_forward(path, &project.upstream())?
                }
                Some(current) => log::warn!(
                    "{} is on branch {} instead of {}; reading its manifests as they are",
                    path.display(),
                    current,
                    branch
                ),
                None => {
                    self.vcs.checkout(path, &CheckoutTarget::Branch(branch))?;
                    self.vcs.fast_forward(path, &project.upstream())?;
                }
            },
        }
        Ok(())
    }
}

fn apply_locks(
    locks: &LockFile,
    projects: &mut BTreeMap<ProjectKey, Project>,
    packages: &mut BTreeMap<PackageKey, Package>,
) {
    for (key, project) in projects.iter_mut() {
        if project.revision.is_none() {
            if let Some(pin) = locks.projects.get(key) {
                project.revision = Some(pin.revision.clone());
            }
        }
    }
    for (key, package) in packages.iter_mut() {
        if package.instance_id.is_none() {
            if let Some(pin) = locks.packages.get(key) {
                package.instance_id = Some(pin.instance_id.clone());
            }
        }
    }
}

/// Every checkout path must belong to exactly one key.
fn check_paths(
    projects: &BTreeMap<ProjectKey, Project>,
    packages: &BTreeMap<PackageKey, Package>,
) -> Result<()> {
    let mut claimed: BTreeMap<&Path, String> = BTreeMap::new();
    let entries = projects
        .iter()
        .map(|(k, p)| (p.path.as_path(), k.to_string()))
        .chain(
            packages
                .iter()
                .map(|(k, p)| (p.path.as_path(), format!("package {}", k))),
        );
    for (path, key) in entries {
        if let Some(other) = claimed.insert(path, key.clone()) {
            return Err(Error::KeyConflict {
                key: path.display().to_string(),
                message: format!("path is claimed by both {} and {}", other, key),
            });
        }
    }
    Ok(())
}

fn bind_hooks(
    hooks: BTreeMap<String, (Hook, String)>,
    projects: &BTreeMap<ProjectKey, Project>,
) -> Result<Vec<Hook>> {
    let mut bound = Vec::with_capacity(hooks.len());
    for (key, (mut hook, origin)) in hooks {
        let owners: Vec<&Project> = projects
            .values()
            .filter(|p| p.name == hook.project)
            .collect();
        match owners.as_slice() {
            [owner] => {
                hook.dir = owner.path.clone();
                bound.push(hook);
            }
            [] => {
                return Err(Error::ManifestParse {
                    path: origin,
                    message: format!("hook {} refers to unknown project {}", key, hook.project),
                    hint: None,
                })
            }
            _ => {
                return Err(Error::ManifestParse {
                    path: origin,
                    message: format!(
                        "hook {} is ambiguous: {} projects are named {}",
                        key,
                        owners.len(),
                        hook.project
                    ),
                    hint: None,
                })
            }
        }
    }
    Ok(bound)
}

/// Resolves the workspace's entry manifest.
pub fn resolve_workspace(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    opts: ResolveOptions,
) -> Result<ResolvedSet> {
    let entry = ws.manifest_file();
    if !entry.is_file() {
        return Err(Error::Workspace {
            message: format!(
                "no manifest at {}; run `grove import` first",
                entry.display()
            ),
        });
    }
    ManifestResolver::new(ws, vcs, opts).resolve(&[entry])
}
