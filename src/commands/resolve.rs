//! # Resolve Command Implementation
//!
//! This module implements the `resolve` subcommand, which resolves one or
//! more manifests and writes a lockfile pinning every project and package
//! they reach.
//!
//! ## Functionality
//!
//! - **Package locks**: Enabled by default; disable with
//!   `--enable-package-lock=false`
//! - **Project locks**: Opt in with `--enable-project-lock`
//! - **Conflicts**: Two manifests pinning the same key differently fail the
//!   command unless `--allow-conflicts` is given
//!
//! The lockfile is deterministic: re-resolving unchanged inputs writes the
//! same bytes.

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use std::path::PathBuf;

use grove::defaults;
use grove::lockfile::{self, LockOptions};
use grove::repository::GitVersionControl;

use crate::cli::GlobalArgs;

/// Generate a lockfile pinning every project and package
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Manifests to resolve. Defaults to the workspace manifest.
    #[arg(value_name = "MANIFEST")]
    pub manifests: Vec<PathBuf>,

    /// Where to write the lockfile; `-` prints it.
    #[arg(short, long, value_name = "PATH", default_value = defaults::LOCKFILE_NAME)]
    pub output: PathBuf,

    /// Use manifest checkouts as they are on disk instead of fetching them.
    #[arg(long)]
    pub local_manifest: bool,

    /// Pin projects as well as packages.
    #[arg(long)]
    pub enable_project_lock: bool,

    /// Pin packages.
    #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    pub enable_package_lock: bool,

    /// Let later manifests win when two pin the same key differently.
    #[arg(long)]
    pub allow_conflicts: bool,
}

impl ResolveArgs {
    fn options(&self) -> LockOptions {
        LockOptions {
            enable_projects: self.enable_project_lock,
            enable_packages: self.enable_package_lock,
            ignore_conflicts: self.allow_conflicts,
            local_manifest: self.local_manifest,
        }
    }
}

/// Execute the `resolve` command.
pub fn execute(args: ResolveArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let manifests = if args.manifests.is_empty() {
        vec![ws.manifest_file()]
    } else {
        args.manifests
            .iter()
            .map(|m| {
                m.canonicalize()
                    .with_context(|| format!("cannot read manifest {}", m.display()))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let lock = lockfile::generate(&ws, &GitVersionControl, &manifests, &args.options())?;
    lock.write(&args.output)
        .with_context(|| format!("Failed to write lockfile {}", args.output.display()))?;
    if args.output.as_os_str() != "-" {
        log::info!(
            "locked {} projects and {} packages in {}",
            lock.projects.len(),
            lock.packages.len(),
            args.output.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ResolveArgs,
    }

    #[test]
    fn test_defaults_lock_packages_only() {
        let h = Harness::try_parse_from(["resolve"]).unwrap();
        let opts = h.args.options();
        assert!(opts.enable_packages);
        assert!(!opts.enable_projects);
        assert_eq!(h.args.output, PathBuf::from("grove.lock"));
    }

    #[test]
    fn test_package_lock_can_be_disabled() {
        let h = Harness::try_parse_from([
            "resolve",
            "--enable-package-lock=false",
            "--enable-project-lock",
            "-o",
            "-",
            "a.yaml",
        ])
        .unwrap();
        let opts = h.args.options();
        assert!(!opts.enable_packages);
        assert!(opts.enable_projects);
        assert_eq!(h.args.manifests, vec![PathBuf::from("a.yaml")]);
    }
}
