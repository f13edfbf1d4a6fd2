//! Orchestrator for the complete update operation
//!
//! This module coordinates the phases into one `update`:
//! 1. Resolve the workspace manifest (fetching imports)
//! 2. Scan the local checkouts
//! 3. Converge the checkouts onto the resolved set
//! 4. Record the outcome in `update_history/latest.yaml`
//! 5. Optionally run hooks and fetch packages
//!
//! Steps 1-4 are retried as a whole, up to the workspace's attempt count,
//! while the failures are transient.

use indicatif::ProgressBar;

use super::converge::{SyncEngine, SyncOptions, SyncReport};
use super::hooks::HookRunner;
use super::packages::{self, PackageReport};
use super::resolve::{resolve_workspace, ResolveOptions};
use super::ResolvedSet;
use crate::defaults;
use crate::error::{Error, Result};
use crate::project::{self, Project};
use crate::repository::VersionControl;
use crate::retry::RetryPolicy;
use crate::scanner::{ProjectScanner, ScanMode};
use crate::snapshot::Snapshot;
use crate::workspace::Workspace;

/// Options for a full update.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub sync: SyncOptions,
    pub resolve: ResolveOptions,
    pub run_hooks: bool,
    pub fetch_packages: bool,
}

/// What an update did.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub resolved: ResolvedSet,
    pub report: SyncReport,
    /// Set when packages were fetched.
    pub packages: Option<PackageReport>,
    /// Set when hooks ran and at least one failed.
    pub hook_error: Option<Error>,
}

impl UpdateOutcome {
    /// Folds every failure of the run into one error.
    pub fn into_result(mut self) -> Result<()> {
        let mut errors = Vec::new();
        errors.extend(self.report.take_error());
        errors.extend(self.hook_error.take());
        match Error::aggregate("update failed", errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Runs a complete update of `ws`.
///
/// Per-project convergence failures do not make this return `Err`; they are
/// in the outcome's report. `Err` means the update could not run at all
/// (bad manifest, conflict) or transient failures persisted through every
/// attempt.
pub fn update(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    opts: &UpdateOptions,
    progress: Option<ProgressBar>,
) -> Result<UpdateOutcome> {
    let retry = RetryPolicy::new(ws.attempts).with_delay(defaults::RETRY_DELAY);
    let (resolved, report) = retry.run_transient(|attempt| {
        log::debug!("update attempt {}/{}", attempt, retry.attempts());
        let resolved = resolve_workspace(ws, vcs, opts.resolve)?;
        let mode = if opts.sync.gc {
            ScanMode::Full
        } else {
            ScanMode::Fast
        };
        let local = ProjectScanner::new(ws, vcs).scan(mode, &resolved.import_checkouts)?;

        let mut engine = SyncEngine::new(ws, vcs, opts.sync.clone());
        if let Some(bar) = &progress {
            engine = engine.with_progress(bar.clone());
        }
        let mut report = engine.converge(&resolved.projects, &local)?;
        record_history(ws, &resolved, &local)?;

        if report.has_transient() && attempt < retry.attempts() {
            let transient: Vec<Error> = std::mem::take(&mut report.failures)
                .into_iter()
                .map(|f| f.error)
                .filter(Error::is_transient)
                .collect();
            if let Some(e) = Error::aggregate("transient failures", transient) {
                return Err(e);
            }
        }
        Ok((resolved, report))
    })?;

    let mut outcome = UpdateOutcome {
        resolved,
        report,
        packages: None,
        hook_error: None,
    };
    if !outcome.report.is_success() {
        if opts.run_hooks || opts.fetch_packages {
            log::warn!("skipping hooks and packages since some projects failed to update");
        }
        return Ok(outcome);
    }
    let post = run_post_sync(ws, vcs, &outcome.resolved, opts.run_hooks, opts.fetch_packages)?;
    outcome.hook_error = post.0;
    outcome.packages = post.1;
    Ok(outcome)
}

/// Runs hooks and fetches packages for an already converged set. A hook
/// failure is returned alongside the package report so that packages are
/// still fetched.
pub fn run_post_sync(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    resolved: &ResolvedSet,
    run_hooks: bool,
    fetch_packages: bool,
) -> Result<(Option<Error>, Option<PackageReport>)> {
    let hook_error = if run_hooks {
        HookRunner::new(ws).run_all(&resolved.hooks).err()
    } else {
        None
    };
    let packages = if fetch_packages && !resolved.packages.is_empty() {
        Some(packages::fetch_packages(ws, vcs, &resolved.packages)?)
    } else {
        None
    };
    Ok((hook_error, packages))
}

/// Records the checkouts the workspace now holds: every target project that
/// was converged plus stale checkouts left in place.
fn record_history(
    ws: &Workspace,
    resolved: &ResolvedSet,
    local: &[project::LocalProject],
) -> Result<()> {
    let mut present: Vec<&Project> = resolved
        .projects
        .values()
        .filter(|p| project::metadata_file(&p.path).is_file())
        .collect();
    present.extend(
        local
            .iter()
            .filter(|l| !resolved.projects.contains_key(&l.key()))
            .filter(|l| project::metadata_file(l.path()).is_file())
            .map(|l| &l.project),
    );
    Snapshot::from_projects(&ws.root, present).write(&ws.latest_snapshot())
}

/// Resolves the workspace and runs its hooks, for `run-hooks`.
pub fn run_hooks_only(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    resolve: ResolveOptions,
    fetch_packages: bool,
) -> Result<Option<PackageReport>> {
    let resolved = resolve_workspace(ws, vcs, resolve)?;
    let (hook_error, packages) = run_post_sync(ws, vcs, &resolved, true, fetch_packages)?;
    match hook_error {
        Some(e) => Err(e),
        None => Ok(packages),
    }
}
