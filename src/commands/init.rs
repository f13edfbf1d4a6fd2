//! # Init Command Implementation
//!
//! This module implements the `init` subcommand, which marks a directory as a
//! grove workspace by creating its `.grove_root/` metadata directory.
//!
//! Initializing an existing workspace is harmless: the metadata directory is
//! left as it is.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use grove::workspace::Workspace;

use crate::cli::GlobalArgs;

/// Create a new workspace
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize. Defaults to the current directory.
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

/// Execute the `init` command.
pub fn execute(args: InitArgs, _globals: &GlobalArgs) -> Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let ws = Workspace::init(&dir)
        .with_context(|| format!("Failed to initialize workspace at {}", dir.display()))?;
    println!("Initialized grove workspace in {}", ws.root.display());
    Ok(())
}
