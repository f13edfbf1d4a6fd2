//! # Version Control Seam
//!
//! Every git interaction the engine performs goes through the
//! [`VersionControl`] trait. The default implementation, [`GitVersionControl`],
//! wraps the system `git` command via [`crate::git::Git`]. Tests substitute
//! [`mock::RecordingVcs`] to simulate checkouts and to count the operations
//! issued, which is how idempotence of a converged workspace is verified.

use std::path::Path;

use crate::error::Result;
use crate::git::{CloneOptions, FetchOptions, Git};

/// What a checkout should point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
    /// Detached HEAD at a fixed revision.
    Revision(String),
    /// A local branch tracking `origin/<branch>`, created if missing.
    Branch(String),
}

/// Trait for version control operations - allows mocking in tests
pub trait VersionControl: Send + Sync {
    fn clone_project(&self, remote: &str, path: &Path, opts: &CloneOptions) -> Result<()>;

    /// Creates or refreshes a bare mirror used as a clone reference.
    fn update_mirror(&self, remote: &str, mirror: &Path) -> Result<()>;

    fn fetch(&self, path: &Path, opts: &FetchOptions) -> Result<()>;

    fn checkout(&self, path: &Path, target: &CheckoutTarget) -> Result<()>;

    /// Fast-forwards the current branch to `upstream`.
    fn fast_forward(&self, path: &Path, upstream: &str) -> Result<()>;

    fn rebase(&self, path: &Path, upstream: &str) -> Result<()>;

    fn current_revision(&self, path: &Path) -> Result<String>;

    fn resolve_revision(&self, path: &Path, revision: &str) -> Result<String>;

    fn current_branch(&self, path: &Path) -> Result<Option<String>>;

    fn branches(&self, path: &Path) -> Result<Vec<String>>;

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool>;

    fn untracked_files(&self, path: &Path) -> Result<Vec<String>>;

    fn remote_url(&self, path: &Path) -> Result<Option<String>>;

    fn set_remote_url(&self, path: &Path, url: &str) -> Result<()>;

    /// Resolves `reference` on `remote` without a local checkout.
    fn remote_revision(&self, remote: &str, reference: &str) -> Result<Option<String>>;
}

/// The default implementation of `VersionControl`, which uses the system's
/// `git` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitVersionControl;

impl VersionControl for GitVersionControl {
    fn clone_project(&self, remote: &str, path: &Path, opts: &CloneOptions) -> Result<()> {
        Git::new().clone_repo(remote, path, opts)
    }

    fn update_mirror(&self, remote: &str, mirror: &Path) -> Result<()> {
        Git::new().update_mirror(remote, mirror)
    }

    fn fetch(&self, path: &Path, opts: &FetchOptions) -> Result<()> {
        Git::at(path).fetch(opts)
    }

    fn checkout(&self, path: &Path, target: &CheckoutTarget) -> Result<()> {
        let git = Git::at(path);
        match target {
            CheckoutTarget::Revision(revision) => git.checkout_detached(revision),
            CheckoutTarget::Branch(branch) => {
                if git.branch_exists(branch)? {
                    git.checkout_branch(branch)
                } else {
                    let upstream = format!("{}/{}", crate::defaults::REMOTE_NAME, branch);
                    git.create_tracking_branch(branch, &upstream)
                }
            }
        }
    }

    fn fast_forward(&self, path: &Path, upstream: &str) -> Result<()> {
        Git::at(path).merge_ff_only(upstream)
    }

    fn rebase(&self, path: &Path, upstream: &str) -> Result<()> {
        Git::at(path).rebase(upstream)
    }

    fn current_revision(&self, path: &Path) -> Result<String> {
        Git::at(path).current_revision()
    }

    fn resolve_revision(&self, path: &Path, revision: &str) -> Result<String> {
        Git::at(path).resolve_revision(revision)
    }

    fn current_branch(&self, path: &Path) -> Result<Option<String>> {
        Git::at(path).current_branch()
    }

    fn branches(&self, path: &Path) -> Result<Vec<String>> {
        Git::at(path).branches()
    }

    fn has_uncommitted_changes(&self, path: &Path) -> Result<bool> {
        Git::at(path).has_uncommitted_changes()
    }

    fn untracked_files(&self, path: &Path) -> Result<Vec<String>> {
        Git::at(path).untracked_files()
    }

    fn remote_url(&self, path: &Path) -> Result<Option<String>> {
        Git::at(path).remote_url(crate::defaults::REMOTE_NAME)
    }

    fn set_remote_url(&self, path: &Path, url: &str) -> Result<()> {
        Git::at(path).set_remote_url(crate::defaults::REMOTE_NAME, url)
    }

    fn remote_revision(&self, remote: &str, reference: &str) -> Result<Option<String>> {
        Git::new().ls_remote(remote, reference)
    }
}
