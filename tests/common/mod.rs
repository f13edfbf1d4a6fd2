//! Shared test utilities for the end-to-end tests.
//!
//! Every fixture works against real `git` repositories on disk: "remotes" are
//! ordinary repositories under `remotes/`, addressed by `file://` URLs, and
//! the workspace lives next to them under `ws/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = WorkspaceFixture::new();
//!     let alpha = fixture.remote("alpha");
//!     let beta = fixture.remote("beta");
//!     let r1 = alpha.commit("README.md", "one");
//!     beta.commit("README.md", "one");
//!     fixture.write_manifest(&pinned_and_tracked(&alpha, &r1, &beta));
//!     fixture.command().arg("update").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{git, pinned_and_tracked, GitRemote, WorkspaceFixture};
}

/// Runs git in `dir` with a fixed identity and returns trimmed stdout.
///
/// Panics when git fails, with its stderr in the message.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Grove Test")
        .env("GIT_AUTHOR_EMAIL", "grove@example.com")
        .env("GIT_COMMITTER_NAME", "Grove Test")
        .env("GIT_COMMITTER_EMAIL", "grove@example.com")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository standing in for a remote.
pub struct GitRemote {
    dir: PathBuf,
}

impl GitRemote {
    fn init(dir: PathBuf) -> Self {
        std::fs::create_dir_all(&dir).expect("Failed to create remote directory");
        git(&dir, &["init", "-q"]);
        git(&dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        Self { dir }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.dir.display())
    }

    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Commits `content` as `file` on the current branch and returns the new
    /// revision.
    pub fn commit(&self, file: &str, content: &str) -> String {
        let path = self.dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        self.commit_all(&format!("update {}", file))
    }

    /// Commits an executable shell script.
    #[allow(dead_code)]
    pub fn commit_script(&self, file: &str, body: &str) -> String {
        let path = self.dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directory");
        }
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("Failed to make script executable");
        }
        self.commit_all(&format!("add {}", file))
    }

    fn commit_all(&self, message: &str) -> String {
        git(&self.dir, &["add", "-A"]);
        git(&self.dir, &["commit", "-q", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> String {
        git(&self.dir, &["rev-parse", "HEAD"])
    }
}

/// Remotes plus an initialized, empty workspace.
pub struct WorkspaceFixture {
    temp_dir: assert_fs::TempDir,
}

impl WorkspaceFixture {
    /// Creates the fixture with an initialized workspace under `ws/`.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("ws/.grove_root")
            .create_dir_all()
            .expect("Failed to create workspace marker");
        Self { temp_dir }
    }

    /// Creates a new remote repository called `name`.
    pub fn remote(&self, name: &str) -> GitRemote {
        GitRemote::init(self.temp_dir.path().join("remotes").join(name))
    }

    /// The workspace root.
    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().join("ws")
    }

    /// A path inside the workspace.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// A path in the fixture, outside the workspace.
    #[allow(dead_code)]
    pub fn outside(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    /// Writes the workspace's entry manifest.
    #[allow(dead_code)]
    pub fn write_manifest(&self, content: &str) {
        self.write(".grove_manifest", content);
    }

    /// Writes a file relative to the workspace root.
    pub fn write(&self, rel: &str, content: &str) {
        self.temp_dir
            .child("ws")
            .child(rel)
            .write_str(content)
            .expect("Failed to write file");
    }

    /// A `grove` command running in the workspace root.
    pub fn command(&self) -> assert_cmd::Command {
        self.command_in(&self.root())
    }

    /// A `grove` command running in `dir`.
    pub fn command_in(&self, dir: &Path) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("grove");
        cmd.current_dir(dir)
            .env_remove("GROVE_ROOT")
            .env_remove("GROVE_JOBS")
            .env_remove("GROVE_CACHE")
            .env("SHELL", "/bin/sh")
            .env("GIT_AUTHOR_NAME", "Grove Test")
            .env("GIT_AUTHOR_EMAIL", "grove@example.com")
            .env("GIT_COMMITTER_NAME", "Grove Test")
            .env("GIT_COMMITTER_EMAIL", "grove@example.com")
            .arg("--color=never");
        cmd
    }
}

impl Default for WorkspaceFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Manifest text declaring a pinned project `a` and a branch-tracking
/// project `b`.
#[allow(dead_code)]
pub fn pinned_and_tracked(alpha: &GitRemote, a_rev: &str, beta: &GitRemote) -> String {
    format!(
        r#"projects:
  - name: a
    path: a
    remote: {}
    revision: {}
  - name: b
    path: src/b
    remote: {}
    remotebranch: main
"#,
        alpha.url(),
        a_rev,
        beta.url()
    )
}
