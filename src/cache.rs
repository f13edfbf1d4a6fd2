//! # Scan Cache
//!
//! Reading HEAD and the current branch of hundreds of checkouts means
//! hundreds of `git` invocations. The scan cache remembers those answers per
//! checkout, keyed by a fingerprint of the files git rewrites whenever HEAD
//! moves (`.git/HEAD`, `.git/index`, `.git/packed-refs` and the loose ref
//! HEAD points at). A checkout whose fingerprint is unchanged since the last
//! scan is answered from the cache without running git.
//!
//! The cache is persisted as JSON under `.grove_root/scan_cache.json`. A
//! missing or unreadable file is treated as an empty cache.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cached observation of one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedState {
    pub fingerprint: String,
    pub revision: String,
    pub branch: Option<String>,
}

/// Thread-safe cache of checkout states.
#[derive(Debug)]
pub struct ScanCache {
    file: PathBuf,
    entries: Mutex<BTreeMap<PathBuf, CachedState>>,
    changed: AtomicBool,
}

impl ScanCache {
    /// Loads the cache stored at `file`.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match fs::read_to_string(&file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::debug!("discarding unreadable scan cache {}: {}", file.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            file,
            entries: Mutex::new(entries),
            changed: AtomicBool::new(false),
        }
    }

    /// The cached state of `path` if its fingerprint still matches.
    pub fn get(&self, path: &Path, fingerprint: &str) -> Result<Option<CachedState>> {
        let entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "scan cache".to_string(),
        })?;
        Ok(entries
            .get(path)
            .filter(|e| e.fingerprint == fingerprint)
            .cloned())
    }

    pub fn insert(&self, path: &Path, state: CachedState) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "scan cache".to_string(),
        })?;
        if entries.get(path) != Some(&state) {
            entries.insert(path.to_path_buf(), state);
            self.changed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Drops entries for checkouts that no longer exist.
    pub fn retain(&self, live: &[PathBuf]) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "scan cache".to_string(),
        })?;
        let before = entries.len();
        entries.retain(|path, _| live.contains(path));
        if entries.len() != before {
            self.changed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Writes the cache back if anything changed.
    pub fn save(&self) -> Result<()> {
        if !self.changed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let entries = self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "scan cache".to_string(),
        })?;
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file, serde_json::to_string_pretty(&*entries)?)?;
        self.changed.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stamp(path: &Path) -> String {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
        .unwrap_or_else(|| "-".to_string())
}

/// Fingerprint of the git state of the checkout at `dir`.
///
/// Returns `None` when `.git` is not a directory (worktrees, submodules),
/// in which case the checkout is never cached.
pub fn fingerprint(dir: &Path) -> Option<String> {
    let git = dir.join(".git");
    if !git.is_dir() {
        return None;
    }
    let head = fs::read_to_string(git.join("HEAD")).ok()?;
    let head = head.trim();
    let mut parts = vec![
        head.to_string(),
        stamp(&git.join("HEAD")),
        stamp(&git.join("index")),
        stamp(&git.join("packed-refs")),
    ];
    if let Some(reference) = head.strip_prefix("ref: ") {
        parts.push(stamp(&git.join(reference)));
    }
    Some(parts.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_git_dir(dir: &Path, head: &str) {
        fs::create_dir_all(dir.join(".git/refs/heads")).unwrap();
        fs::write(dir.join(".git/HEAD"), head).unwrap();
    }

    #[test]
    fn test_fingerprint_requires_git_dir() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(fingerprint(tmp.path()).is_none());
        fake_git_dir(tmp.path(), "ref: refs/heads/main\n");
        assert!(fingerprint(tmp.path()).is_some());
    }

    #[test]
    fn test_fingerprint_changes_with_head() {
        let tmp = tempfile::tempdir().unwrap();
        fake_git_dir(tmp.path(), "ref: refs/heads/main\n");
        let before = fingerprint(tmp.path()).unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "0123456789abcdef\n").unwrap();
        assert_ne!(before, fingerprint(tmp.path()).unwrap());
    }

    #[test]
    fn test_get_honors_fingerprint() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ScanCache::load(tmp.path().join("cache.json"));
        let state = CachedState {
            fingerprint: "f1".to_string(),
            revision: "r1".to_string(),
            branch: None,
        };
        cache.insert(Path::new("/w/a"), state.clone()).unwrap();
        assert_eq!(cache.get(Path::new("/w/a"), "f1").unwrap(), Some(state));
        assert_eq!(cache.get(Path::new("/w/a"), "f2").unwrap(), None);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("meta/cache.json");
        let cache = ScanCache::load(&file);
        cache
            .insert(
                Path::new("/w/a"),
                CachedState {
                    fingerprint: "f".to_string(),
                    revision: "r".to_string(),
                    branch: Some("main".to_string()),
                },
            )
            .unwrap();
        cache.save().unwrap();

        let reloaded = ScanCache::load(&file);
        assert_eq!(reloaded.len(), 1);
        reloaded.retain(&[]).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_corrupt_cache_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("cache.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(ScanCache::load(&file).is_empty());
    }
}
