//! # Run-Hooks Command Implementation
//!
//! This module implements the `run-hooks` subcommand, which resolves the
//! workspace manifest and runs every hook it declares without touching the
//! checkouts. Hooks run in parallel; each one is killed when it exceeds the
//! hook timeout.

use anyhow::Result;
use clap::Args;

use grove::output::symbol;
use grove::phases::orchestrator;
use grove::phases::resolve::ResolveOptions;
use grove::repository::GitVersionControl;

use crate::cli::{hook_timeout, GlobalArgs};

/// Run the hooks declared by the manifests
#[derive(Args, Debug, Default)]
pub struct RunHooksArgs {
    /// Use manifest checkouts as they are on disk instead of fetching them.
    #[arg(long)]
    pub local_manifest: bool,

    /// Kill hooks running longer than this many minutes.
    #[arg(long, value_name = "MINUTES")]
    pub hook_timeout: Option<u64>,

    /// Fetch the manifests' packages as well.
    #[arg(long)]
    pub fetch_packages: bool,
}

/// Execute the `run-hooks` command.
pub fn execute(args: RunHooksArgs, globals: &GlobalArgs) -> Result<()> {
    let mut ws = globals.workspace()?;
    if let Some(timeout) = hook_timeout(args.hook_timeout) {
        ws = ws.with_hook_timeout(timeout);
    }
    let resolve = ResolveOptions {
        local_manifest: args.local_manifest,
        ..ResolveOptions::default()
    };
    let packages =
        orchestrator::run_hooks_only(&ws, &GitVersionControl, resolve, args.fetch_packages)?;

    let output = globals.output();
    println!("{} hooks finished", symbol(&output, "✔", "[OK]"));
    if let Some(packages) = packages {
        println!(
            "{} packages: {} fetched, {} unchanged",
            symbol(&output, "✔", "[OK]"),
            packages.fetched.len(),
            packages.unchanged
        );
    }
    Ok(())
}
