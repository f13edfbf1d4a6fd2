//! Thin wrapper over the system `git` binary.
//!
//! Every operation shells out to `git`, which automatically picks up SSH
//! keys, credential helpers and anything configured in `~/.gitconfig`.
//! Failures are classified into [`Error::TransientVcs`] (worth retrying) and
//! [`Error::GitCommand`] (permanent) by looking at git's stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use url::Url;

use crate::error::{Error, Result};

/// Fragments of git stderr that indicate a failure worth retrying.
const TRANSIENT_PATTERNS: &[&str] = &[
    "Could not resolve host",
    "unable to access",
    "early EOF",
    "the remote end hung up unexpectedly",
    "RPC failed",
    "Connection reset",
    "Connection timed out",
    "Operation timed out",
    "Temporary failure in name resolution",
    ".lock': File exists",
    "index.lock",
];

/// Options for cloning a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Shallow clone depth, if any.
    pub depth: Option<u32>,
    /// Local repository to borrow objects from (`--reference`).
    pub reference: Option<PathBuf>,
    /// Branch to check out after cloning.
    pub branch: Option<String>,
    /// Skip the initial checkout.
    pub no_checkout: bool,
}

/// Options for fetching from a remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub remote: String,
    /// Explicit refspec or revision to fetch, if any.
    pub refspec: Option<String>,
    pub depth: Option<u32>,
    pub prune: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            remote: crate::defaults::REMOTE_NAME.to_string(),
            refspec: None,
            depth: None,
            prune: true,
        }
    }
}

/// Runs git commands, optionally inside a working directory.
#[derive(Debug, Clone, Default)]
pub struct Git {
    dir: Option<PathBuf>,
}

impl Git {
    /// Git invocations that do not need a working directory (clone, ls-remote).
    pub fn new() -> Self {
        Self { dir: None }
    }

    /// Git invocations inside the repository at `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    fn dir_display(&self) -> String {
        self.dir
            .as_deref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| ".".to_string())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        // Never block on a credential prompt.
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Runs git and returns its raw output regardless of exit status.
    pub fn run_raw<S: AsRef<str>>(&self, args: &[S]) -> Result<Output> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        log::trace!("git {} (in {})", args.join(" "), self.dir_display());
        let output = self.command().args(&args).output()?;
        Ok(output)
    }

    /// Runs git and fails on a non-zero exit status.
    pub fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<Output> {
        let output = self.run_raw(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(self.failure(args, &output))
        }
    }

    /// Runs git and returns its trimmed stdout.
    pub fn output<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn failure<S: AsRef<str>>(&self, args: &[S], output: &Output) -> Error {
        let command = args
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if is_transient_stderr(&stderr) {
            Error::TransientVcs {
                command,
                dir: self.dir_display(),
                stderr,
            }
        } else {
            Error::GitCommand {
                command,
                dir: self.dir_display(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr,
            }
        }
    }

    /// Clones `remote` into `target`, creating parent directories as needed.
    pub fn clone_repo(&self, remote: &str, target: &Path, opts: &CloneOptions) -> Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut args = vec!["clone".to_string()];
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={}", depth));
        }
        if let Some(reference) = &opts.reference {
            args.push("--reference-if-able".to_string());
            args.push(reference.display().to_string());
        }
        if let Some(branch) = &opts.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        if opts.no_checkout {
            args.push("--no-checkout".to_string());
        }
        args.push(remote.to_string());
        args.push(target.display().to_string());
        self.run(&args)?;
        Ok(())
    }

    /// Creates or refreshes a bare mirror of `remote` at `target`.
    pub fn update_mirror(&self, remote: &str, target: &Path) -> Result<()> {
        if target.join("HEAD").exists() {
            Git::at(target).run(&["remote", "update", "--prune"])?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let target = target.display().to_string();
            self.run(&["clone", "--mirror", remote, target.as_str()])?;
        }
        Ok(())
    }

    pub fn fetch(&self, opts: &FetchOptions) -> Result<()> {
        let mut args = vec!["fetch".to_string()];
        if opts.prune {
            args.push("--prune".to_string());
        }
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={}", depth));
        }
        args.push(opts.remote.clone());
        if let Some(refspec) = &opts.refspec {
            args.push(refspec.clone());
        }
        self.run(&args)?;
        Ok(())
    }

    /// Detaches HEAD at `revision`. Git refuses to clobber local changes.
    pub fn checkout_detached(&self, revision: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "--detach", revision])?;
        Ok(())
    }

    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", branch])?;
        Ok(())
    }

    /// Creates `branch` tracking `upstream` and checks it out.
    pub fn create_tracking_branch(&self, branch: &str, upstream: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "-b", branch, "--track", upstream])?;
        Ok(())
    }

    pub fn merge_ff_only(&self, revision: &str) -> Result<()> {
        self.run(&["merge", "--quiet", "--ff-only", revision])?;
        Ok(())
    }

    /// Rebases the current branch onto `upstream`, aborting on conflict.
    pub fn rebase(&self, upstream: &str) -> Result<()> {
        if let Err(e) = self.run(&["rebase", upstream]) {
            let _ = self.run_raw(&["rebase", "--abort"]);
            return Err(e);
        }
        Ok(())
    }

    /// Resolves `revision` to a full commit hash.
    pub fn resolve_revision(&self, revision: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", revision);
        self.output(&["rev-parse", "--verify", "--quiet", spec.as_str()])
    }

    pub fn current_revision(&self) -> Result<String> {
        self.output(&["rev-parse", "HEAD"])
    }

    /// The checked-out branch, or `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let output = self.run_raw(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else if output.status.code() == Some(1) {
            Ok(None)
        } else {
            Err(self.failure(&["symbolic-ref", "--quiet", "--short", "HEAD"], &output))
        }
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{}", branch);
        let output = self.run_raw(&["show-ref", "--verify", "--quiet", reference.as_str()])?;
        Ok(output.status.success())
    }

    pub fn branches(&self) -> Result<Vec<String>> {
        let out = self.output(&["for-each-ref", "--format=%(refname:short)", "refs/heads"])?;
        Ok(lines(&out))
    }

    /// Whether tracked files differ from HEAD (staged or not).
    pub fn has_uncommitted_changes(&self) -> Result<bool> {
        let out = self.output(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!out.is_empty())
    }

    pub fn untracked_files(&self) -> Result<Vec<String>> {
        let out = self.output(&["ls-files", "--others", "--exclude-standard"])?;
        Ok(lines(&out))
    }

    /// URL of the remote named `name`, or `None` if it is not configured.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        let key = format!("remote.{}.url", name);
        let output = self.run_raw(&["config", "--get", key.as_str()])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    pub fn set_remote_url(&self, name: &str, url: &str) -> Result<()> {
        self.run(&["remote", "set-url", name, url])?;
        Ok(())
    }

    /// Looks up `reference` on `remote` without a local checkout.
    pub fn ls_remote(&self, remote: &str, reference: &str) -> Result<Option<String>> {
        let out = self.output(&["ls-remote", remote, reference])?;
        Ok(out
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string))
    }

    /// Pushes `refspec` to `remote`, returning stdout and stderr.
    pub fn push(&self, remote: &str, refspec: &str, extra: &[String]) -> Result<Output> {
        let mut args = vec!["push".to_string()];
        args.extend(extra.iter().cloned());
        args.push(remote.to_string());
        args.push(refspec.to_string());
        self.run_raw(&args)
    }
}

/// Whether git's stderr describes a failure worth retrying.
pub fn is_transient_stderr(stderr: &str) -> bool {
    TRANSIENT_PATTERNS.iter().any(|p| stderr.contains(p))
}

/// Whether git refused an operation because it would overwrite local files.
pub fn is_overwrite_refusal(error: &Error) -> bool {
    match error {
        Error::GitCommand { stderr, .. } => {
            stderr.contains("would be overwritten")
                || stderr.contains("Please commit your changes or stash them")
        }
        _ => false,
    }
}

/// Canonical identity of a remote URL.
///
/// URLs are compared after parsing, so host case, default ports, a trailing
/// slash and a `.git` suffix do not matter. Remotes that are not URLs
/// (`host:path` or plain paths) only lose the trailing slash and suffix.
pub fn normalize_remote(remote: &str) -> String {
    match Url::parse(remote) {
        Ok(mut url) if url.has_host() || url.scheme() == "file" => {
            let path = strip_repo_suffix(url.path()).to_string();
            url.set_path(&path);
            url.set_fragment(None);
            url.to_string()
        }
        _ => strip_repo_suffix(remote).to_string(),
    }
}

fn strip_repo_suffix(s: &str) -> &str {
    let trimmed = s.trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

fn lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
