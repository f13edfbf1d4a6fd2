//! # Workspace Configuration
//!
//! A workspace is a directory containing a `.grove_root/` marker and, usually,
//! a `.grove_manifest` entry manifest. [`Workspace`] carries the root together
//! with the run-wide knobs every phase reads: concurrency, attempts and the
//! hook time budget.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};
use crate::project::{self, Project};

/// Run-wide configuration anchored at a workspace root.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    /// Maximum number of concurrent workers.
    pub jobs: usize,
    /// Attempts for retryable operations; always at least 1.
    pub attempts: u32,
    pub hook_timeout: Duration,
}

/// Where a path sits relative to managed checkouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectLocation {
    /// The path is inside this checkout.
    Found(Project),
    NotFound,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jobs: defaults::default_jobs(),
            attempts: defaults::DEFAULT_ATTEMPTS,
            hook_timeout: defaults::default_hook_timeout(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Creates the workspace marker under `dir` and returns the workspace.
    pub fn init(dir: &Path) -> Result<Workspace> {
        fs::create_dir_all(dir)?;
        let root = dir.canonicalize()?;
        fs::create_dir_all(root.join(defaults::META_DIR))?;
        Ok(Workspace::new(root))
    }

    /// Finds the workspace root.
    ///
    /// An explicit root wins; otherwise the nearest ancestor of `start`
    /// holding a `.grove_root/` marker is used. Symlinks are resolved first so
    /// the same workspace is always reported under the same path.
    pub fn find_root(explicit: Option<&Path>, start: &Path) -> Result<PathBuf> {
        if let Some(root) = explicit {
            let root = root.canonicalize().map_err(|e| Error::Workspace {
                message: format!("cannot access root {}: {}", root.display(), e),
            })?;
            if !root.join(defaults::META_DIR).is_dir() {
                return Err(Error::Workspace {
                    message: format!(
                        "{} is not a workspace (no {} directory); run `grove init`",
                        root.display(),
                        defaults::META_DIR
                    ),
                });
            }
            return Ok(root);
        }
        let start = start.canonicalize()?;
        start
            .ancestors()
            .find(|dir| dir.join(defaults::META_DIR).is_dir())
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Workspace {
                message: format!(
                    "no workspace found at or above {}; run `grove init` or pass --root",
                    start.display()
                ),
            })
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(defaults::META_DIR)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join(defaults::MANIFEST_FILE)
    }

    pub fn scan_cache_file(&self) -> PathBuf {
        self.meta_dir().join(defaults::SCAN_CACHE_FILE)
    }

    pub fn update_history_dir(&self) -> PathBuf {
        self.meta_dir().join(defaults::UPDATE_HISTORY_DIR)
    }

    pub fn latest_snapshot(&self) -> PathBuf {
        self.update_history_dir().join(defaults::LATEST_SNAPSHOT)
    }

    /// Finds the managed checkout enclosing `start`.
    ///
    /// Walks upward from `start` and stops at the workspace root; the root
    /// itself is never reported as a project.
    pub fn find_project(&self, start: &Path) -> ProjectLocation {
        let Ok(start) = start.canonicalize() else {
            return ProjectLocation::NotFound;
        };
        if !start.starts_with(&self.root) {
            return ProjectLocation::NotFound;
        }
        for dir in start.ancestors() {
            if dir == self.root {
                break;
            }
            if project::metadata_file(dir).is_file() {
                return match project::read_metadata(dir, &self.root) {
                    Ok(p) => ProjectLocation::Found(p),
                    Err(e) => {
                        log::warn!("ignoring {}: {}", dir.display(), e);
                        ProjectLocation::NotFound
                    }
                };
            }
        }
        ProjectLocation::NotFound
    }
}
