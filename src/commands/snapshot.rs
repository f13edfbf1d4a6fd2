//! # Snapshot Command Implementation
//!
//! This module implements the `snapshot` subcommand, which writes a manifest
//! pinning every checkout in the workspace at its current revision. Feeding
//! the snapshot back as a manifest reproduces the workspace exactly.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use grove::repository::GitVersionControl;
use grove::scanner::{self, ScanMode};
use grove::snapshot::Snapshot;

use crate::cli::GlobalArgs;

/// Write a manifest pinning every checkout at its current revision
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Output file; `-` prints the snapshot.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// Execute the `snapshot` command.
pub fn execute(args: SnapshotArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let local = scanner::local_projects(&ws, &GitVersionControl, ScanMode::Full)?;
    let snapshot = Snapshot::from_local(&ws.root, &local);

    if args.file.as_os_str() == "-" {
        print!("{}", snapshot.to_yaml()?);
        return Ok(());
    }
    snapshot
        .write(&args.file)
        .with_context(|| format!("Failed to write snapshot {}", args.file.display()))?;
    log::info!(
        "pinned {} projects in {}",
        local.len(),
        args.file.display()
    );
    Ok(())
}
