//! # Import Command Implementation
//!
//! This module implements the `import` subcommand, which adds a remote
//! manifest import to the workspace's `.grove_manifest` (or to another file
//! given with `--out`).
//!
//! An import equal in identity to an existing one (same remote, manifest and
//! name) replaces it, so running the same `import` twice leaves a single
//! entry. `--overwrite` discards everything else the file declared.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use grove::defaults;
use grove::manifest::{Import, Manifest};

use crate::cli::GlobalArgs;

/// Add a remote manifest import to the workspace manifest
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Manifest file path inside the remote repository.
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Remote URL of the repository holding the manifest.
    #[arg(value_name = "REMOTE")]
    pub remote: String,

    /// Name of the checkout the manifest repository is cloned as.
    #[arg(long, default_value = defaults::DEFAULT_IMPORT_NAME)]
    pub name: String,

    /// Pin the manifest repository to this revision.
    #[arg(long, value_name = "REV")]
    pub revision: Option<String>,

    /// Branch of the manifest repository to track.
    #[arg(long, value_name = "BRANCH", default_value = defaults::DEFAULT_BRANCH)]
    pub remote_branch: String,

    /// Directory under the workspace root the import's projects live in.
    #[arg(long = "import-root", value_name = "DIR")]
    pub import_root: Option<PathBuf>,

    /// Manifest file to edit instead of the workspace's `.grove_manifest`.
    /// Use `-` to print the result.
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Replace the file's contents with just this import.
    #[arg(long)]
    pub overwrite: bool,
}

/// Execute the `import` command.
pub fn execute(args: ImportArgs, globals: &GlobalArgs) -> Result<()> {
    let target = match &args.out {
        Some(out) => out.clone(),
        None => globals.workspace()?.manifest_file(),
    };
    let to_stdout = target == Path::new("-");

    let mut manifest = if args.overwrite || to_stdout || !target.exists() {
        Manifest::default()
    } else {
        Manifest::from_file(&target)
            .with_context(|| format!("Failed to load manifest {}", target.display()))?
    };

    add_import(
        &mut manifest,
        Import {
            remote: args.remote,
            manifest: args.manifest,
            name: args.name,
            revision: args.revision,
            remote_branch: args.remote_branch,
            root: args.import_root,
        },
    );

    if to_stdout {
        print!("{}", manifest.to_yaml()?);
    } else {
        manifest
            .to_file(&target)
            .with_context(|| format!("Failed to write manifest {}", target.display()))?;
        log::info!("updated {}", target.display());
    }
    Ok(())
}

/// Adds `import`, replacing an entry with the same remote, manifest and name.
fn add_import(manifest: &mut Manifest, import: Import) {
    let same = |i: &Import| {
        i.remote == import.remote && i.manifest == import.manifest && i.name == import.name
    };
    match manifest.imports.iter_mut().find(|i| same(i)) {
        Some(existing) => *existing = import,
        None => manifest.imports.push(import),
    }
}
