//! Default values for grove workspaces.
//!
//! This module provides centralized default values and well-known file names
//! used across commands, ensuring consistency and avoiding duplication.

use std::path::PathBuf;
use std::time::Duration;

/// Directory at the workspace root that marks it as a grove workspace.
pub const META_DIR: &str = ".grove_root";

/// Entry manifest of a workspace, relative to the root.
pub const MANIFEST_FILE: &str = ".grove_manifest";

/// Per-project metadata directory, relative to the checkout. Kept inside
/// `.git` so it never shows up as an untracked file.
pub const PROJECT_META_DIR: &str = ".git/grove";

/// Metadata file inside [`PROJECT_META_DIR`].
pub const PROJECT_METADATA_FILE: &str = "metadata.json";

/// Lockfile name, both as command output default and as a sibling of
/// manifests that pins their subtree.
pub const LOCKFILE_NAME: &str = "grove.lock";

/// Scan cache file inside [`META_DIR`].
pub const SCAN_CACHE_FILE: &str = "scan_cache.json";

/// Update history directory inside [`META_DIR`].
pub const UPDATE_HISTORY_DIR: &str = "update_history";

/// Snapshot of the last successful update inside [`UPDATE_HISTORY_DIR`].
pub const LATEST_SNAPSHOT: &str = "latest.yaml";

/// Stamp written into fetched package directories.
pub const PACKAGE_STAMP: &str = ".grove_package";

/// Environment variable naming the workspace root.
pub const ROOT_ENV: &str = "GROVE_ROOT";

/// Remote name used for every managed checkout.
pub const REMOTE_NAME: &str = "origin";

/// Branch tracked when a manifest entry names none.
pub const DEFAULT_BRANCH: &str = "main";

/// Version control protocol accepted in manifests.
pub const DEFAULT_PROTOCOL: &str = "git";

/// Name given to an import's checkout when the manifest omits one.
pub const DEFAULT_IMPORT_NAME: &str = "manifest";

/// Package version used when a manifest omits one.
pub const DEFAULT_PACKAGE_VERSION: &str = "HEAD";

/// Merge policies applied to `runp` environments when none are given.
pub const DEFAULT_MERGE_POLICIES: &str = "+CFLAGS,+CXXFLAGS,+LDFLAGS,:PATH,^GOROOT*";

/// Default number of attempts for retryable operations.
pub const DEFAULT_ATTEMPTS: u32 = 1;

/// Default per-hook time budget in minutes.
pub const DEFAULT_HOOK_TIMEOUT_MINUTES: u64 = 5;

/// Pause between retry attempts of a whole update.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Grace period between asking a subprocess to stop and killing it.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Interval at which subprocess waits poll for completion or cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Returns the default number of concurrent workers.
///
/// Uses the number of available CPUs, falling back to 1 when it cannot be
/// determined.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Returns the default hook timeout.
pub fn default_hook_timeout() -> Duration {
    Duration::from_secs(DEFAULT_HOOK_TIMEOUT_MINUTES * 60)
}

/// Returns the default mirror cache directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/grove` (XDG Base Directory)
/// - macOS: `~/Library/Caches/grove`
/// - Windows: `{FOLDERID_LocalAppData}\grove`
///
/// Falls back to `.grove-cache` in the current directory if the platform
/// cache directory cannot be determined.
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".grove-cache"))
        .join("grove")
}
