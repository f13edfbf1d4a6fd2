//! # Local Project Scanner
//!
//! Discovers the managed checkouts of a workspace and observes their state.
//!
//! - **Fast** mode reads the project list recorded by the last successful
//!   update (`.grove_root/update_history/latest.yaml`) and only visits those
//!   directories. If the snapshot is missing, or a listed checkout is gone,
//!   it falls back to a full scan.
//! - **Full** mode walks the whole tree looking for `.git/grove/metadata.json`,
//!   which also finds checkouts nested inside other checkouts.
//!
//! Revision and branch lookups go through the [`ScanCache`] so unchanged
//! checkouts cost no git invocations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cache::{self, CachedState, ScanCache};
use crate::defaults;
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::project::{self, LocalProject, Project};
use crate::repository::VersionControl;
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

/// How checkouts are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Fast,
    Full,
}

/// Discovers and inspects the checkouts of one workspace.
pub struct ProjectScanner<'a> {
    ws: &'a Workspace,
    vcs: &'a dyn VersionControl,
    cache: ScanCache,
    check_dirty: bool,
}

impl<'a> ProjectScanner<'a> {
    pub fn new(ws: &'a Workspace, vcs: &'a dyn VersionControl) -> Self {
        Self {
            ws,
            vcs,
            cache: ScanCache::load(ws.scan_cache_file()),
            check_dirty: false,
        }
    }

    /// Also compute uncommitted and untracked state for every checkout.
    pub fn with_dirty_check(mut self, check: bool) -> Self {
        self.check_dirty = check;
        self
    }

    /// Scans the workspace. `extra` lists additional directories to inspect
    /// even if the fast path does not know them (fresh import checkouts).
    pub fn scan(&self, mode: ScanMode, extra: &[PathBuf]) -> Result<Vec<LocalProject>> {
        let dirs = match mode {
            ScanMode::Fast => match self.snapshot_dirs()? {
                Some(dirs) => dirs,
                None => {
                    log::debug!("fast scan unavailable, walking {}", self.ws.root.display());
                    self.walk()
                }
            },
            ScanMode::Full => self.walk(),
        };
        let mut dirs: BTreeSet<PathBuf> = dirs.into_iter().collect();
        dirs.extend(
            extra
                .iter()
                .filter(|d| project::metadata_file(d).is_file())
                .cloned(),
        );

        let mut projects = Vec::new();
        for dir in &dirs {
            match project::read_metadata(dir, &self.ws.root) {
                Ok(p) => projects.push(p),
                Err(e) => log::warn!("skipping {}: {}", dir.display(), e),
            }
        }

        let pool = WorkerPool::new(self.ws.jobs);
        let states = pool.map(projects, |p| self.inspect(p))?;
        let mut local = Vec::with_capacity(states.len());
        let mut failures = Vec::new();
        for state in states {
            match state {
                Ok(l) => local.push(l),
                Err(e) => failures.push(e),
            }
        }
        if let Some(e) = Error::aggregate("scanning checkouts failed", failures) {
            return Err(e);
        }
        local.sort_by(|a, b| a.key().cmp(&b.key()));

        if mode == ScanMode::Full {
            let live: Vec<PathBuf> = local.iter().map(|l| l.project.path.clone()).collect();
            self.cache.retain(&live)?;
        }
        if let Err(e) = self.cache.save() {
            log::debug!("could not persist scan cache: {}", e);
        }
        Ok(local)
    }

    /// Directories listed in the last update snapshot, or `None` when the
    /// fast path cannot be trusted.
    fn snapshot_dirs(&self) -> Result<Option<Vec<PathBuf>>> {
        let file = self.ws.latest_snapshot();
        if !file.is_file() {
            return Ok(None);
        }
        let snapshot = match Snapshot::from_file(&file) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("ignoring unreadable {}: {}", file.display(), e);
                return Ok(None);
            }
        };
        let mut dirs = Vec::new();
        for p in &snapshot.manifest.projects {
            let dir = self.ws.root.join(&p.path);
            if !project::metadata_file(&dir).is_file() {
                log::debug!("{} moved or removed since last update", dir.display());
                return Ok(None);
            }
            dirs.push(dir);
        }
        Ok(Some(dirs))
    }

    /// Every directory under the root holding project metadata.
    fn walk(&self) -> Vec<PathBuf> {
        let skip = [".git", defaults::META_DIR];
        WalkDir::new(&self.ws.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !(e.file_type().is_dir()
                    && e.file_name()
                        .to_str()
                        .is_some_and(|n| skip.contains(&n)))
            })
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    log::debug!("walk error: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_dir() && project::metadata_file(e.path()).is_file())
            .map(|e| e.into_path())
            .collect()
    }

    fn inspect(&self, project: Project) -> Result<LocalProject> {
        let path = project.path.clone();
        let fingerprint = cache::fingerprint(&path);
        let cached = match &fingerprint {
            Some(f) => self.cache.get(&path, f)?,
            None => None,
        };
        let (revision, branch) = match cached {
            Some(state) => (state.revision, state.branch),
            None => {
                let revision = self.vcs.current_revision(&path)?;
                let branch = self.vcs.current_branch(&path)?;
                if let Some(f) = fingerprint {
                    self.cache.insert(
                        &path,
                        CachedState {
                            fingerprint: f,
                            revision: revision.clone(),
                            branch: branch.clone(),
                        },
                    )?;
                }
                (revision, branch)
            }
        };
        let (dirty, untracked) = if self.check_dirty {
            (
                Some(self.vcs.has_uncommitted_changes(&path)?),
                Some(!self.vcs.untracked_files(&path)?.is_empty()),
            )
        } else {
            (None, None)
        };
        Ok(LocalProject {
            project,
            revision,
            branch,
            dirty,
            untracked,
        })
    }
}

/// Convenience wrapper for a one-off scan.
pub fn local_projects(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    mode: ScanMode,
) -> Result<Vec<LocalProject>> {
    ProjectScanner::new(ws, vcs).scan(mode, &[])
}

/// Whether `path` lies strictly inside one of `candidates`.
pub fn is_nested_in(path: &Path, candidates: &[PathBuf]) -> bool {
    candidates
        .iter()
        .any(|c| path != c.as_path() && path.starts_with(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::RecordingVcs;
    use crate::git::CloneOptions;

    fn managed(ws: &Workspace, vcs: &RecordingVcs, name: &str, path: &str) -> Project {
        let remote = format!("https://example.com/{}", name);
        vcs.set_remote_ref(&remote, "main", &format!("{}-rev", name));
        let project = Project::new(name, ws.root.join(path), &remote);
        vcs.clone_project(&remote, &project.path, &CloneOptions::default())
            .unwrap();
        project::write_metadata(&project, &ws.root).unwrap();
        project
    }

    #[test]
    fn test_full_scan_finds_nested_checkouts() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap().with_jobs(2);
        let vcs = RecordingVcs::new();
        managed(&ws, &vcs, "outer", "outer");
        managed(&ws, &vcs, "inner", "outer/inner");

        let found = ProjectScanner::new(&ws, &vcs)
            .scan(ScanMode::Full, &[])
            .unwrap();
        let names: Vec<_> = found.iter().map(|l| l.project.name.as_str()).collect();
        assert_eq!(names, vec!["inner", "outer"]);
        assert_eq!(found[0].revision, "inner-rev");
        assert_eq!(found[0].branch.as_deref(), Some("main"));
        assert!(found[0].dirty.is_none());
    }

    #[test]
    fn test_fast_scan_uses_snapshot_and_falls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        let vcs = RecordingVcs::new();
        let a = managed(&ws, &vcs, "a", "a");
        let b = managed(&ws, &vcs, "b", "b");

        // Snapshot lists only `a`: the fast path trusts it.
        Snapshot::from_projects(&ws.root, [&a]).write(&ws.latest_snapshot()).unwrap();
        let fast = local_projects(&ws, &vcs, ScanMode::Fast).unwrap();
        assert_eq!(fast.len(), 1);

        // The snapshot mentions a vanished checkout: fall back to a walk.
        Snapshot::from_projects(&ws.root, [&a, &b, &Project::new("gone", ws.root.join("gone"), "r")])
            .write(&ws.latest_snapshot())
            .unwrap();
        let fallback = local_projects(&ws, &vcs, ScanMode::Fast).unwrap();
        assert_eq!(fallback.len(), 2);
    }

    #[test]
    fn test_extra_dirs_are_included() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        let vcs = RecordingVcs::new();
        let a = managed(&ws, &vcs, "a", "a");
        let b = managed(&ws, &vcs, "b", "b");
        Snapshot::from_projects(&ws.root, [&a]).write(&ws.latest_snapshot()).unwrap();

        let found = ProjectScanner::new(&ws, &vcs)
            .scan(ScanMode::Fast, &[b.path.clone()])
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_dirty_check() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::init(tmp.path()).unwrap();
        let vcs = RecordingVcs::new();
        let a = managed(&ws, &vcs, "a", "a");
        vcs.set_dirty(&a.path, true);

        let found = ProjectScanner::new(&ws, &vcs)
            .with_dirty_check(true)
            .scan(ScanMode::Full, &[])
            .unwrap();
        assert_eq!(found[0].dirty, Some(true));
        assert_eq!(found[0].untracked, Some(false));
    }

    #[test]
    fn test_is_nested_in() {
        let outer = PathBuf::from("/w/outer");
        assert!(is_nested_in(Path::new("/w/outer/inner"), &[outer.clone()]));
        assert!(!is_nested_in(Path::new("/w/outer"), &[outer.clone()]));
        assert!(!is_nested_in(Path::new("/w/other"), &[outer]));
    }
}
