//! Phase 2: Convergence
//!
//! Brings the checkouts on disk in line with a resolved project set.
//!
//! ## Process
//!
//! 1. **Plan** - Every target project is matched against the scanned local
//!    checkouts, first by key, then by path and name (a project whose remote
//!    moved). Each pairing becomes one [`Operation`].
//! 2. **Delete** - Checkouts no longer in the target set are removed when
//!    garbage collection is enabled and reported as stale otherwise.
//! 3. **Move** - Checkouts whose path changed are renamed, one at a time.
//! 4. **Create / Update** - Run on the worker pool in waves, so a project
//!    nested inside another project's checkout is only cloned once its parent
//!    exists.
//!
//! A failure converging one project never stops the others. Failures are
//! collected into the [`SyncReport`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indicatif::ProgressBar;

use crate::error::{Error, Result};
use crate::git::{self, CloneOptions, FetchOptions};
use crate::pool::WorkerPool;
use crate::project::{self, LocalProject, Project, ProjectKey};
use crate::repository::{CheckoutTarget, VersionControl};
use crate::workspace::Workspace;

/// Options controlling convergence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete checkouts that are no longer part of the target set.
    pub gc: bool,
    /// Fetch and fast-forward branch-tracking projects that are already on
    /// their branch.
    pub pull_tracked: bool,
    /// Clone new projects with this history depth.
    pub shallow_depth: Option<u32>,
    /// Directory of bare mirrors that new clones borrow objects from.
    pub cache_dir: Option<PathBuf>,
}

/// What has to happen to one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update {
        /// The checkout's origin points at an outdated URL.
        remote_changed: bool,
    },
    Move {
        from: PathBuf,
        /// The checkout also has to move to a new revision.
        update: bool,
    },
    Delete,
    /// Not in the target set, left in place.
    Stale,
    Null {
        /// The recorded metadata differs from the target.
        refresh_metadata: bool,
    },
}

/// One planned convergence step.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    /// The target project, or the local project for deletes and stale
    /// checkouts.
    pub project: Project,
    pub local: Option<LocalProject>,
}

impl Operation {
    pub fn key(&self) -> ProjectKey {
        self.project.key()
    }

    pub fn path(&self) -> &Path {
        &self.project.path
    }

    fn is_mutating(&self) -> bool {
        !matches!(
            self.kind,
            OperationKind::Stale
                | OperationKind::Null {
                    refresh_metadata: false
                }
        )
    }
}

/// A project that could not be converged.
#[derive(Debug)]
pub struct ProjectFailure {
    pub key: ProjectKey,
    pub path: PathBuf,
    pub error: Error,
}

/// Outcome of one convergence pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: Vec<ProjectKey>,
    pub updated: Vec<ProjectKey>,
    pub moved: Vec<ProjectKey>,
    pub deleted: Vec<ProjectKey>,
    /// Checkouts outside the target set that were left in place.
    pub stale: Vec<Project>,
    pub unchanged: usize,
    pub failures: Vec<ProjectFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether any failure might go away on retry.
    pub fn has_transient(&self) -> bool {
        self.failures.iter().any(|f| f.error.is_transient())
    }

    /// Drains the failures into one error, if there were any.
    pub fn take_error(&mut self) -> Option<Error> {
        let errors = std::mem::take(&mut self.failures)
            .into_iter()
            .map(|f| Error::Project {
                project: f.key.name.clone(),
                message: format!("{}: {}", f.path.display(), f.error),
            })
            .collect();
        Error::aggregate("converging projects failed", errors)
    }

    fn record(&mut self, op: &Operation, result: Result<()>) {
        let key = op.key();
        if let Err(error) = result {
            log::debug!("{} failed: {}", key, error);
            self.failures.push(ProjectFailure {
                key,
                path: op.project.path.clone(),
                error,
            });
            return;
        }
        match &op.kind {
            OperationKind::Create => self.created.push(key),
            OperationKind::Update { .. } => self.updated.push(key),
            OperationKind::Move { .. } => self.moved.push(key),
            OperationKind::Delete => self.deleted.push(key),
            OperationKind::Stale => self.stale.push(op.project.clone()),
            OperationKind::Null { .. } => self.unchanged += 1,
        }
    }
}

/// Computes the operations that converge `local` onto `target`.
///
/// `vcs` is only consulted to resolve symbolic revisions; planning never
/// changes a checkout.
pub fn plan(
    target: &BTreeMap<ProjectKey, Project>,
    local: &[LocalProject],
    opts: &SyncOptions,
    vcs: &dyn VersionControl,
) -> Vec<Operation> {
    let mut by_key: HashMap<ProjectKey, Vec<usize>> = HashMap::new();
    for (i, l) in local.iter().enumerate() {
        by_key.entry(l.key()).or_default().push(i);
    }
    let mut claimed = vec![false; local.len()];
    let mut ops = Vec::new();
    let mut unmatched = Vec::new();

    for (key, project) in target {
        let candidates = by_key.get(key).map(Vec::as_slice).unwrap_or_default();
        let pick = candidates
            .iter()
            .copied()
            .find(|&i| local[i].path() == project.path)
            .or_else(|| candidates.iter().copied().find(|&i| !claimed[i]));
        match pick {
            Some(i) => {
                claimed[i] = true;
                let l = &local[i];
                let update = needs_update(project, l, opts, vcs);
                let kind = if l.path() != project.path {
                    OperationKind::Move {
                        from: l.path().to_path_buf(),
                        update,
                    }
                } else if update {
                    OperationKind::Update {
                        remote_changed: false,
                    }
                } else {
                    OperationKind::Null {
                        refresh_metadata: l.project != *project,
                    }
                };
                ops.push(Operation {
                    kind,
                    project: project.clone(),
                    local: Some(l.clone()),
                });
            }
            None => unmatched.push(project),
        }
    }

    // A checkout at the right path under the right name whose remote changed.
    for project in unmatched {
        let same_place = local
            .iter()
            .enumerate()
            .find(|(i, l)| !claimed[*i] && l.path() == project.path && l.project.name == project.name);
        match same_place {
            Some((i, l)) => {
                claimed[i] = true;
                ops.push(Operation {
                    kind: OperationKind::Update {
                        remote_changed: true,
                    },
                    project: project.clone(),
                    local: Some(l.clone()),
                });
            }
            None => ops.push(Operation {
                kind: OperationKind::Create,
                project: project.clone(),
                local: None,
            }),
        }
    }

    for (i, l) in local.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        ops.push(Operation {
            kind: if opts.gc {
                OperationKind::Delete
            } else {
                OperationKind::Stale
            },
            project: l.project.clone(),
            local: Some(l.clone()),
        });
    }
    ops
}

fn needs_update(
    project: &Project,
    local: &LocalProject,
    opts: &SyncOptions,
    vcs: &dyn VersionControl,
) -> bool {
    match &project.revision {
        Some(wanted) => {
            if revision_matches(wanted, &local.revision) {
                return false;
            }
            if is_hex(wanted) {
                return true;
            }
            match vcs.resolve_revision(local.path(), wanted) {
                Ok(resolved) => resolved != local.revision,
                Err(e) => {
                    log::debug!("cannot resolve {} in {}: {}", wanted, local.path().display(), e);
                    true
                }
            }
        }
        None => local.branch.is_none() || opts.pull_tracked,
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether a pinned `wanted` revision names the commit `actual`. Abbreviated
/// hashes of at least seven digits match by prefix.
fn revision_matches(wanted: &str, actual: &str) -> bool {
    wanted == actual || (wanted.len() >= 7 && is_hex(wanted) && actual.starts_with(wanted))
}

/// Converges checkouts of one workspace.
pub struct SyncEngine<'a> {
    ws: &'a Workspace,
    vcs: &'a dyn VersionControl,
    opts: SyncOptions,
    progress: Option<ProgressBar>,
    mirror_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(ws: &'a Workspace, vcs: &'a dyn VersionControl, opts: SyncOptions) -> Self {
        Self {
            ws,
            vcs,
            opts,
            progress: None,
            mirror_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Reports progress on `bar`, one tick per mutating operation.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Plans and executes convergence. Per-project failures end up in the
    /// report; an `Err` means the pass could not run at all.
    pub fn converge(
        &self,
        target: &BTreeMap<ProjectKey, Project>,
        local: &[LocalProject],
    ) -> Result<SyncReport> {
        let ops = plan(target, local, &self.opts, self.vcs);
        let mut report = SyncReport::default();
        if let Some(bar) = &self.progress {
            bar.set_length(ops.iter().filter(|o| o.is_mutating()).count() as u64);
        }

        let mut deletes = Vec::new();
        let mut moves = Vec::new();
        let mut work = Vec::new();
        for op in ops {
            match op.kind {
                OperationKind::Delete => deletes.push(op),
                OperationKind::Move { .. } => moves.push(op),
                OperationKind::Create
                | OperationKind::Update { .. }
                | OperationKind::Null {
                    refresh_metadata: true,
                } => work.push(op),
                OperationKind::Stale => {
                    log::info!(
                        "{} is no longer in the manifest; run with --gc to delete it",
                        op.path().display()
                    );
                    report.record(&op, Ok(()));
                }
                OperationKind::Null { .. } => report.record(&op, Ok(())),
            }
        }

        let pool = WorkerPool::new(self.ws.jobs);
        let target_paths: Vec<PathBuf> = target.values().map(|p| p.path.clone()).collect();
        let results = pool.map(deletes, |op| {
            let result = self.delete(&op, &target_paths);
            (op, result)
        })?;
        for (op, result) in results {
            self.tick(&op);
            match result {
                Ok(true) => report.record(&op, Ok(())),
                Ok(false) => {
                    let stale = Operation {
                        kind: OperationKind::Stale,
                        ..op
                    };
                    report.record(&stale, Ok(()));
                }
                Err(e) => report.record(&op, Err(e)),
            }
        }

        moves.sort_by(|a, b| a.path().cmp(b.path()));
        for op in moves {
            let result = self.relocate(&op);
            self.tick(&op);
            report.record(&op, result);
        }

        for wave in waves(work) {
            let results = pool.map(wave, |op| {
                let result = self.apply(&op);
                (op, result)
            })?;
            for (op, result) in results {
                self.tick(&op);
                report.record(&op, result);
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        Ok(report)
    }

    fn tick(&self, op: &Operation) {
        if let Some(bar) = &self.progress {
            bar.set_message(op.project.name.clone());
            bar.inc(1);
        }
    }

    /// Removes a stale checkout. Returns `Ok(false)` when it was kept because
    /// a target project lives inside it.
    fn delete(&self, op: &Operation, target_paths: &[PathBuf]) -> Result<bool> {
        let path = op.path();
        if let Some(inner) = target_paths.iter().find(|p| p.starts_with(path) && p.as_path() != path) {
            log::warn!(
                "not deleting {}: {} is still managed inside it",
                path.display(),
                inner.display()
            );
            return Ok(false);
        }
        let mut details = Vec::new();
        if self.vcs.has_uncommitted_changes(path)? {
            details.push("uncommitted changes".to_string());
        }
        let untracked = self.vcs.untracked_files(path)?;
        if !untracked.is_empty() {
            details.push(format!("{} untracked file(s)", untracked.len()));
        }
        if !details.is_empty() {
            return Err(Error::DirtyWorkingTree {
                project: op.project.name.clone(),
                path: path.display().to_string(),
                details: details.join(", "),
                remediation: format!(
                    "commit, move or discard the changes in {} and rerun the update, or remove the directory by hand",
                    path.display()
                ),
            });
        }
        log::info!("deleting {}", path.display());
        fs::remove_dir_all(path)?;
        Ok(true)
    }

    fn relocate(&self, op: &Operation) -> Result<()> {
        let OperationKind::Move { from, update } = &op.kind else {
            return Ok(());
        };
        let to = op.path();
        if to.exists() && !is_empty_dir(to)? {
            return Err(Error::Project {
                project: op.project.name.clone(),
                message: format!(
                    "cannot move {} to {}: destination is not empty",
                    from.display(),
                    to.display()
                ),
            });
        }
        log::info!("moving {} to {}", from.display(), to.display());
        if to.exists() {
            fs::remove_dir(to)?;
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(from, to)?;
        if *update {
            self.update(&op.project, false)
        } else {
            self.finish(&op.project)
        }
    }

    fn apply(&self, op: &Operation) -> Result<()> {
        match &op.kind {
            OperationKind::Create => self.create(&op.project),
            OperationKind::Update { remote_changed } => self.update(&op.project, *remote_changed),
            OperationKind::Null { .. } => self.finish(&op.project),
            _ => Ok(()),
        }
    }

    fn create(&self, project: &Project) -> Result<()> {
        let path = &project.path;
        if path.exists() && !is_empty_dir(path)? {
            return Err(Error::Project {
                project: project.name.clone(),
                message: format!(
                    "cannot clone into {}: directory exists and is not empty",
                    path.display()
                ),
            });
        }
        log::info!("cloning {} into {}", project.remote, path.display());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let opts = CloneOptions {
            depth: self.opts.shallow_depth,
            reference: self.mirror_for(&project.remote)?,
            branch: if project.is_pinned() {
                None
            } else {
                Some(project.remote_branch.clone())
            },
            no_checkout: project.is_pinned(),
        };
        self.vcs.clone_project(&project.remote, path, &opts)?;

        if let Some(revision) = &project.revision {
            if self.opts.shallow_depth.is_some() {
                // A shallow clone only has the default branch tip.
                self.vcs.fetch(
                    path,
                    &FetchOptions {
                        refspec: Some(revision.clone()),
                        depth: self.opts.shallow_depth,
                        ..FetchOptions::default()
                    },
                )?;
            }
        }
        self.checkout(project)?;
        self.finish(project)
    }

    fn update(&self, project: &Project, remote_changed: bool) -> Result<()> {
        let path = &project.path;
        if self.vcs.has_uncommitted_changes(path)? {
            return Err(Error::DirtyWorkingTree {
                project: project.name.clone(),
                path: path.display().to_string(),
                details: "uncommitted changes".to_string(),
                remediation: format!(
                    "commit or stash the changes in {} and rerun the update",
                    path.display()
                ),
            });
        }
        if remote_changed {
            log::info!("{}: origin is now {}", project.name, project.remote);
            self.vcs.set_remote_url(path, &project.remote)?;
        }
        log::debug!("updating {}", path.display());
        let fetch = match (&project.revision, self.opts.shallow_depth) {
            (Some(revision), Some(depth)) => FetchOptions {
                refspec: Some(revision.clone()),
                depth: Some(depth),
                ..FetchOptions::default()
            },
            _ => FetchOptions::default(),
        };
        self.vcs.fetch(path, &fetch)?;

        if project.is_pinned() {
            self.checkout(project)?;
        } else {
            match self.vcs.current_branch(path)? {
                Some(branch) if branch == project.remote_branch => {}
                Some(branch) => {
                    log::warn!(
                        "{} is on branch {} instead of {}; fetched without merging",
                        path.display(),
                        branch,
                        project.remote_branch
                    );
                    return self.finish(project);
                }
                None => self.checkout(project)?,
            }
            self.vcs
                .fast_forward(path, &project.upstream())
                .map_err(|e| Error::Project {
                    project: project.name.clone(),
                    message: format!(
                        "cannot fast-forward {} to {}: {}",
                        project.remote_branch,
                        project.upstream(),
                        e
                    ),
                })?;
        }
        self.finish(project)
    }

    fn checkout(&self, project: &Project) -> Result<()> {
        self.vcs
            .checkout(&project.path, &project.checkout_target())
            .map_err(|e| {
                if git::is_overwrite_refusal(&e) {
                    Error::DirtyWorkingTree {
                        project: project.name.clone(),
                        path: project.path.display().to_string(),
                        details: "local files would be overwritten by the checkout".to_string(),
                        remediation: format!(
                            "move or delete the conflicting files in {} and rerun the update",
                            project.path.display()
                        ),
                    }
                } else {
                    e
                }
            })?;
        if let CheckoutTarget::Revision(revision) = project.checkout_target() {
            let actual = self.vcs.current_revision(&project.path)?;
            if !revision_matches(&revision, &actual) && is_hex(&revision) {
                return Err(Error::Project {
                    project: project.name.clone(),
                    message: format!("HEAD is {} after checking out {}", actual, revision),
                });
            }
        }
        Ok(())
    }

    /// Records metadata and installs githooks for a converged checkout.
    fn finish(&self, project: &Project) -> Result<()> {
        project::install_githooks(project)?;
        project::write_metadata(project, &self.ws.root)
    }

    /// Refreshes the mirror of `remote`, returning its path, when a cache
    /// directory is configured. Mirrors are updated one caller at a time.
    fn mirror_for(&self, remote: &str) -> Result<Option<PathBuf>> {
        let Some(cache) = &self.opts.cache_dir else {
            return Ok(None);
        };
        let mirror = cache.join(mirror_name(remote));
        let lock = {
            let mut locks = self.mirror_locks.lock().map_err(|_| Error::LockPoisoned {
                context: "mirror locks".to_string(),
            })?;
            Arc::clone(locks.entry(mirror.clone()).or_default())
        };
        let _guard = lock.lock().map_err(|_| Error::LockPoisoned {
            context: format!("mirror {}", mirror.display()),
        })?;
        fs::create_dir_all(cache)?;
        self.vcs.update_mirror(remote, &mirror)?;
        Ok(Some(mirror))
    }
}

/// Directory name of the mirror for `remote`.
fn mirror_name(remote: &str) -> String {
    let mut name: String = git::normalize_remote(remote)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    name.push_str(".git");
    name
}

/// Splits create and update work into waves. A project waits for every
/// project being created at a path that contains it.
fn waves(work: Vec<Operation>) -> Vec<Vec<Operation>> {
    let creating: Vec<PathBuf> = work
        .iter()
        .filter(|o| o.kind == OperationKind::Create)
        .map(|o| o.project.path.clone())
        .collect();
    let mut levels: BTreeMap<usize, Vec<Operation>> = BTreeMap::new();
    for op in work {
        let depth = creating
            .iter()
            .filter(|c| op.path().starts_with(c) && c.as_path() != op.path())
            .count();
        levels.entry(depth).or_default().push(op);
    }
    levels.into_values().collect()
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::RecordingVcs;
    use crate::scanner::{ProjectScanner, ScanMode};

    struct Fixture {
        _dir: tempfile::TempDir,
        ws: Workspace,
        vcs: RecordingVcs,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let ws = Workspace::init(dir.path()).unwrap().with_jobs(4);
            let vcs = RecordingVcs::new();
            vcs.set_remote_ref("https://example.com/a", "main", "a-tip");
            vcs.set_remote_ref("https://example.com/a", "r1", "r1");
            vcs.set_remote_ref("https://example.com/b", "main", "b-tip");
            Self { _dir: dir, ws, vcs }
        }

        fn target(&self, projects: Vec<Project>) -> BTreeMap<ProjectKey, Project> {
            projects
                .into_iter()
                .map(|mut p| {
                    p.path = self.ws.root.join(&p.path);
                    (p.key(), p)
                })
                .collect()
        }

        fn scan(&self) -> Vec<LocalProject> {
            ProjectScanner::new(&self.ws, &self.vcs)
                .scan(ScanMode::Full, &[])
                .unwrap()
        }

        fn sync(&self, target: &BTreeMap<ProjectKey, Project>, opts: SyncOptions) -> SyncReport {
            let local = self.scan();
            SyncEngine::new(&self.ws, &self.vcs, opts)
                .converge(target, &local)
                .unwrap()
        }
    }

    fn a_and_b() -> Vec<Project> {
        vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
            Project::new("b", "b", "https://example.com/b"),
        ]
    }

    #[test]
    fn test_fresh_workspace_clones_pinned_and_tracked() {
        let fx = Fixture::new();
        let target = fx.target(a_and_b());
        let report = fx.sync(&target, SyncOptions::default());
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.created.len(), 2);

        let a = fx.vcs.checkout_state(&fx.ws.root.join("a")).unwrap();
        assert_eq!(a.revision, "r1");
        assert_eq!(a.branch, None);
        let b = fx.vcs.checkout_state(&fx.ws.root.join("b")).unwrap();
        assert_eq!(b.revision, "b-tip");
        assert_eq!(b.branch.as_deref(), Some("main"));
        assert!(project::metadata_file(&fx.ws.root.join("a")).is_file());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let fx = Fixture::new();
        let target = fx.target(a_and_b());
        fx.sync(&target, SyncOptions::default());
        fx.vcs.clear_calls();

        let report = fx.sync(&target, SyncOptions::default());
        assert!(report.is_success());
        assert_eq!(report.unchanged, 2);
        assert!(fx.vcs.mutating_calls().is_empty(), "{:?}", fx.vcs.mutating_calls());
    }

    #[test]
    fn test_pin_change_updates_checkout() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        fx.vcs.set_remote_ref("https://example.com/a", "r2", "r2");

        let moved = vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r2"),
            Project::new("b", "b", "https://example.com/b"),
        ];
        let report = fx.sync(&fx.target(moved), SyncOptions::default());
        assert_eq!(report.updated.len(), 1);
        assert_eq!(fx.vcs.checkout_state(&fx.ws.root.join("a")).unwrap().revision, "r2");
    }

    #[test]
    fn test_pull_tracked_fast_forwards_branch() {
        let fx = Fixture::new();
        let target = fx.target(a_and_b());
        fx.sync(&target, SyncOptions::default());
        fx.vcs.set_remote_ref("https://example.com/b", "main", "b-next");

        let report = fx.sync(
            &target,
            SyncOptions {
                pull_tracked: true,
                ..SyncOptions::default()
            },
        );
        assert!(report.is_success());
        let b = fx.vcs.checkout_state(&fx.ws.root.join("b")).unwrap();
        assert_eq!(b.revision, "b-next");
        assert_eq!(b.branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_dirty_checkout_fails_only_that_project() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        fx.vcs.set_dirty(&fx.ws.root.join("a"), true);
        fx.vcs.set_remote_ref("https://example.com/a", "r2", "r2");
        fx.vcs.set_remote_ref("https://example.com/b", "main", "b-next");

        let changed = vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r2"),
            Project::new("b", "b", "https://example.com/b"),
        ];
        let report = fx.sync(
            &fx.target(changed),
            SyncOptions {
                pull_tracked: true,
                ..SyncOptions::default()
            },
        );
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, Error::DirtyWorkingTree { .. }));
        assert_eq!(report.updated.len(), 1);
        assert_eq!(fx.vcs.checkout_state(&fx.ws.root.join("a")).unwrap().revision, "r1");
    }

    #[test]
    fn test_removed_project_is_stale_unless_gc() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        let only_a = fx.target(vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
        ]);

        let report = fx.sync(&only_a, SyncOptions::default());
        assert_eq!(report.stale.len(), 1);
        assert!(fx.ws.root.join("b").exists());

        let report = fx.sync(
            &only_a,
            SyncOptions {
                gc: true,
                ..SyncOptions::default()
            },
        );
        assert_eq!(report.deleted.len(), 1);
        assert!(!fx.ws.root.join("b").exists());
    }

    #[test]
    fn test_gc_refuses_dirty_checkout() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        fx.vcs.set_untracked(&fx.ws.root.join("b"), &["notes.txt"]);
        let only_a = fx.target(vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
        ]);

        let report = fx.sync(
            &only_a,
            SyncOptions {
                gc: true,
                ..SyncOptions::default()
            },
        );
        assert_eq!(report.failures.len(), 1);
        assert!(fx.ws.root.join("b").exists());
    }

    #[test]
    fn test_path_change_moves_checkout() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        let relocated = fx.target(vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
            Project::new("b", "lib/b", "https://example.com/b"),
        ]);

        let report = fx.sync(&relocated, SyncOptions::default());
        assert_eq!(report.moved.len(), 1);
        assert!(!fx.ws.root.join("b").exists());
        assert!(project::metadata_file(&fx.ws.root.join("lib/b")).is_file());
    }

    #[test]
    fn test_nested_projects_clone_parent_first() {
        let fx = Fixture::new();
        let target = fx.target(vec![
            Project::new("b", "a/b", "https://example.com/b"),
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
        ]);
        let report = fx.sync(&target, SyncOptions::default());
        assert!(report.is_success(), "{:?}", report.failures);
        let clones: Vec<String> = fx
            .vcs
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("clone"))
            .collect();
        assert!(clones[0].contains("example.com/a"));
        assert!(clones[1].contains("example.com/b"));
    }

    #[test]
    fn test_remote_change_rewrites_origin() {
        let fx = Fixture::new();
        fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        fx.vcs.set_remote_ref("https://mirror.example.com/b", "main", "b-tip");
        let target = fx.target(vec![
            Project::new("a", "a", "https://example.com/a").with_revision("r1"),
            Project::new("b", "b", "https://mirror.example.com/b"),
        ]);

        let report = fx.sync(&target, SyncOptions::default());
        assert!(report.is_success(), "{:?}", report.failures);
        assert!(fx
            .vcs
            .calls()
            .iter()
            .any(|c| c.starts_with("set_remote_url") && c.ends_with("https://mirror.example.com/b")));
        assert!(report.stale.is_empty());
    }

    #[test]
    fn test_clone_refuses_non_empty_directory() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.ws.root.join("b")).unwrap();
        fs::write(fx.ws.root.join("b/README"), "hi").unwrap();
        let report = fx.sync(&fx.target(a_and_b()), SyncOptions::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key.name, "b");
    }

    #[test]
    fn test_cache_dir_clones_through_mirror() {
        let fx = Fixture::new();
        let cache = fx.ws.root.join(".cache");
        fx.sync(
            &fx.target(a_and_b()),
            SyncOptions {
                cache_dir: Some(cache.clone()),
                ..SyncOptions::default()
            },
        );
        assert_eq!(
            fx.vcs.calls().iter().filter(|c| c.starts_with("mirror")).count(),
            2
        );
        assert!(cache.join("https___example.com_a.git").exists());
    }

    #[test]
    fn test_revision_matches_abbreviations() {
        assert!(revision_matches("abcdef1", "abcdef1234567890"));
        assert!(!revision_matches("abc", "abcdef1234567890"));
        assert!(revision_matches("v1.0", "v1.0"));
    }

    #[test]
    fn test_take_error_aggregates() {
        let mut report = SyncReport::default();
        for name in ["a", "b"] {
            report.failures.push(ProjectFailure {
                key: ProjectKey::new(name, "r"),
                path: PathBuf::from(name),
                error: Error::Workspace {
                    message: "boom".to_string(),
                },
            });
        }
        let err = report.take_error().unwrap();
        assert!(matches!(err, Error::Multiple { ref errors, .. } if errors.len() == 2));
        assert!(report.is_success());
    }
}
