//! # List Command Implementation
//!
//! This module implements the `list` subcommand, which prints every checkout
//! in the workspace with its path, current branch and revision.
//!
//! This command is a safe, read-only operation that does not modify any
//! checkout.

use anyhow::Result;
use clap::Args;
use std::path::Path;

use grove::project::LocalProject;
use grove::repository::GitVersionControl;
use grove::scanner::{ProjectScanner, ScanMode};

use crate::cli::GlobalArgs;

/// List the checkouts in the workspace
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only list checkouts with uncommitted changes or untracked files.
    #[arg(long)]
    pub dirty: bool,

    /// Walk the whole workspace instead of trusting the last update record.
    #[arg(long)]
    pub full: bool,
}

/// Execute the `list` command.
pub fn execute(args: ListArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let vcs = GitVersionControl;
    let mode = if args.full {
        ScanMode::Full
    } else {
        ScanMode::Fast
    };
    let local = ProjectScanner::new(&ws, &vcs)
        .with_dirty_check(args.dirty)
        .scan(mode, &[])?;

    for l in local.iter().filter(|l| !args.dirty || is_dirty(l)) {
        println!("{}", format_line(&ws.root, l));
    }
    Ok(())
}

fn is_dirty(l: &LocalProject) -> bool {
    l.dirty == Some(true) || l.untracked == Some(true)
}

fn format_line(root: &Path, l: &LocalProject) -> String {
    let path = l.path().strip_prefix(root).unwrap_or(l.path());
    let at = match &l.branch {
        Some(branch) => branch.as_str(),
        None => "(detached)",
    };
    let short = &l.revision[..l.revision.len().min(12)];
    let mut line = format!("{} {} {} {}", l.project.name, path.display(), at, short);
    if is_dirty(l) {
        line.push_str(" *");
    }
    line
}
