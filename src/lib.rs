//! # Grove Library
//!
//! This library provides the core functionality of `grove`, a tool that keeps
//! a workspace of many git checkouts in the state declared by a tree of
//! manifests. It is designed to be used by the `grove` command-line tool but
//! can also be embedded by anything that needs to resolve manifests or drive
//! a workspace programmatically.
//!
//! ## Quick Example
//!
//! ```
//! use grove::manifest::Manifest;
//! use std::path::Path;
//!
//! let yaml = r#"
//! projects:
//!   - name: tools
//!     path: src/tools
//!     remote: https://example.com/tools.git
//!     revision: 1a2b3c4d5e6f
//! "#;
//! let manifest = Manifest::parse(yaml, Path::new(".grove_manifest")).unwrap();
//! assert_eq!(manifest.projects.len(), 1);
//! assert!(manifest.projects[0].is_pinned());
//! ```
//!
//! ## Core Concepts
//!
//! - **Workspace (`workspace`)**: The root directory marked by `.grove_root/`,
//!   together with the job count, attempt count and hook timeout every
//!   operation runs with.
//! - **Manifests (`manifest`, `project`)**: YAML documents declaring projects,
//!   hooks, packages and imports of further manifests.
//! - **Version control (`repository`, `git`)**: The `VersionControl` trait the
//!   core drives, and its implementation on top of the `git` binary.
//! - **Phases (`phases`)**: Resolution of the manifest graph, convergence of
//!   the checkouts, hooks and packages.
//! - **Runners (`runp`, `envvar`, `pool`, `process`)**: Bounded parallel
//!   execution of user commands across projects.
//!
//! ## Execution Flow
//!
//! `grove update` is driven by `phases::orchestrator`:
//!
//! 1.  **Resolve**: Walk the import graph into one set of projects, hooks and
//!     packages keyed by identity.
//! 2.  **Scan**: Read the checkouts that already exist.
//! 3.  **Converge**: Plan and apply creates, moves, updates and deletes.
//! 4.  **Record**: Write the update snapshot.
//! 5.  **Post-sync**: Optionally run hooks and fetch packages.

pub mod cache;
pub mod defaults;
pub mod envvar;
pub mod error;
pub mod git;
pub mod lockfile;
pub mod manifest;
pub mod output;
pub mod phases;
pub mod pool;
pub mod process;
pub mod project;
pub mod repository;
pub mod retry;
pub mod review;
pub mod runp;
pub mod scanner;
pub mod snapshot;
pub mod workspace;

#[cfg(test)]
mod envvar_proptest;
