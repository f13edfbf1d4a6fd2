//! Phase 3: Hooks
//!
//! Runs the hook scripts declared by resolved projects. Hooks are independent
//! of each other, so they run concurrently on the worker pool. Each run gets
//! its own deadline; a hook that overruns it is terminated and counts as
//! failed. A failed hook is retried up to the workspace's attempt count
//! without affecting the others, and every hook that still fails is listed in
//! the returned error.

use std::process::Command;
use std::time::{Duration, Instant};

use crate::defaults;
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::process::{self, WaitOutcome};
use crate::project::Hook;
use crate::retry::RetryPolicy;
use crate::workspace::Workspace;

/// Runs hooks for one workspace.
pub struct HookRunner<'a> {
    ws: &'a Workspace,
    timeout: Duration,
}

impl<'a> HookRunner<'a> {
    /// A runner using the workspace's hook timeout.
    pub fn new(ws: &'a Workspace) -> Self {
        Self {
            ws,
            timeout: ws.hook_timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs every hook. Returns an aggregate of the hooks that failed on
    /// their last attempt.
    pub fn run_all(&self, hooks: &[Hook]) -> Result<()> {
        if hooks.is_empty() {
            return Ok(());
        }
        log::info!("running {} hook(s)", hooks.len());
        let pool = WorkerPool::new(self.ws.jobs);
        let retry = RetryPolicy::new(self.ws.attempts);
        let results = pool.map(hooks.iter().collect(), |hook| {
            retry.run(|_| self.run_one(hook), is_retryable)
        })?;
        let failures: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        let count = failures.len();
        match Error::aggregate(format!("{} hook(s) failed", count), failures) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_one(&self, hook: &Hook) -> Result<()> {
        let action = hook.action_path();
        if !action.is_file() {
            return Err(Error::HookFailure {
                hook: hook.to_string(),
                status: format!("action {} not found", action.display()),
                output: String::new(),
            });
        }
        log::debug!("running hook {} ({})", hook, action.display());
        let mut cmd = Command::new(&action);
        cmd.current_dir(&hook.dir)
            .env(defaults::ROOT_ENV, &self.ws.root);
        let deadline = Instant::now() + self.timeout;
        let captured = process::run_captured(cmd, Some(deadline), None)?;
        match captured.outcome {
            WaitOutcome::Exited(status) if status.success() => Ok(()),
            WaitOutcome::Exited(status) => Err(Error::HookFailure {
                hook: hook.to_string(),
                status: process::describe(&status),
                output: captured.combined().trim_end().to_string(),
            }),
            WaitOutcome::TimedOut | WaitOutcome::Cancelled => Err(Error::HookTimeout {
                hook: hook.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

/// A missing script will not appear on a second attempt.
fn is_retryable(error: &Error) -> bool {
    !matches!(error, Error::HookFailure { status, .. } if status.starts_with("action "))
}

/// Runs `hooks` with the workspace defaults.
pub fn run_hooks(ws: &Workspace, hooks: &[Hook]) -> Result<()> {
    HookRunner::new(ws).run_all(hooks)
}
