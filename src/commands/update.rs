//! # Update Command Implementation
//!
//! This module implements the `update` subcommand, which resolves the
//! workspace manifest and converges every checkout onto it.
//!
//! ## Functionality
//!
//! - **Convergence**: Creates, moves and updates checkouts; stale checkouts
//!   are reported, or deleted with `--gc`
//! - **Retries**: Transient failures retry the whole update up to `--attempts`
//! - **Post-sync**: `--run-hooks` and `--fetch-packages` run after a fully
//!   successful convergence
//! - **Mirrors**: `--cache` clones through bare mirrors kept in a cache
//!   directory
//!
//! A partial failure still converges every other project; the command then
//! prints each failure and exits with status 1.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use grove::defaults;
use grove::output::{progress_bar, render_summary, symbol};
use grove::phases::converge::SyncOptions;
use grove::phases::orchestrator::{self, UpdateOptions};
use grove::phases::resolve::ResolveOptions;
use grove::repository::GitVersionControl;

use crate::cli::{hook_timeout, GlobalArgs};

/// Bring every checkout in line with the manifests
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Delete checkouts that are no longer in the manifests.
    #[arg(long)]
    pub gc: bool,

    /// Use manifest checkouts as they are on disk instead of fetching them.
    #[arg(long)]
    pub local_manifest: bool,

    /// Also fetch and fast-forward projects already on their tracked branch.
    #[arg(long)]
    pub pull_tracked: bool,

    /// Run the manifests' hooks afterwards.
    #[arg(long)]
    pub run_hooks: bool,

    /// Fetch the manifests' packages afterwards.
    #[arg(long)]
    pub fetch_packages: bool,

    /// Kill hooks running longer than this many minutes.
    #[arg(long, value_name = "MINUTES")]
    pub hook_timeout: Option<u64>,

    /// Clone new projects with this history depth.
    #[arg(long, value_name = "N")]
    pub shallow_depth: Option<u32>,

    /// Clone through bare mirrors kept in DIR (default: the user cache
    /// directory).
    #[arg(long, value_name = "DIR", env = "GROVE_CACHE", num_args = 0..=1)]
    pub cache: Option<Option<PathBuf>>,

    /// Ignore `grove.lock` files next to the manifests.
    #[arg(long)]
    pub no_lockfiles: bool,

    /// Let later lockfiles win when two disagree.
    #[arg(long)]
    pub allow_lock_conflicts: bool,
}

impl UpdateArgs {
    fn options(&self) -> UpdateOptions {
        UpdateOptions {
            sync: SyncOptions {
                gc: self.gc,
                pull_tracked: self.pull_tracked,
                shallow_depth: self.shallow_depth,
                cache_dir: self
                    .cache
                    .as_ref()
                    .map(|dir| dir.clone().unwrap_or_else(defaults::default_cache_root)),
            },
            resolve: ResolveOptions {
                local_manifest: self.local_manifest,
                use_lockfiles: !self.no_lockfiles,
                ignore_lock_conflicts: self.allow_lock_conflicts,
            },
            run_hooks: self.run_hooks,
            fetch_packages: self.fetch_packages,
        }
    }
}

/// Execute the `update` command.
pub fn execute(args: UpdateArgs, globals: &GlobalArgs) -> Result<()> {
    let mut ws = globals.workspace()?;
    if let Some(timeout) = hook_timeout(args.hook_timeout) {
        ws = ws.with_hook_timeout(timeout);
    }
    let output = globals.output();
    let bar = progress_bar(&output);

    let outcome = orchestrator::update(&ws, &GitVersionControl, &args.options(), Some(bar.clone()));
    bar.finish_and_clear();
    let outcome = outcome?;

    println!("{}", render_summary(&output, &outcome.report));
    if let Some(packages) = &outcome.packages {
        println!(
            "{} packages: {} fetched, {} unchanged",
            symbol(&output, "✔", "[OK]"),
            packages.fetched.len(),
            packages.unchanged
        );
    }
    outcome.into_result()?;
    Ok(())
}
