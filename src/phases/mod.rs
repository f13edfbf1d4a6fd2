//! Implementation of the phases of a workspace update.
//!
//! ## Overview
//!
//! An update runs these phases:
//! 1. Resolution - Expand the manifest import graph into one set of projects,
//!    hooks and packages (fetching import repositories as needed)
//! 2. Convergence - Compare the resolved set against the checkouts on disk and
//!    create, update, move or remove checkouts until they match
//! 3. Hooks - Run the scripts declared by the resolved projects
//! 4. Packages - Fetch the pinned packages
//!
//! Phases 1 and 2 are retried together when they fail transiently; see
//! [`orchestrator`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::project::{Hook, Package, PackageKey, Project, ProjectKey};

// Phase modules
pub mod converge;
pub mod hooks;
pub mod orchestrator;
pub mod packages;
pub mod resolve;

/// One manifest in the import graph, as visited by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportNode {
    pub label: String,
    /// Set when the manifest had already been resolved through another path.
    pub repeated: bool,
    pub children: Vec<ImportNode>,
}

impl ImportNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            repeated: false,
            children: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: ImportNode) {
        self.children.push(child);
    }
}

/// The flattened result of resolving an import graph.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSet {
    /// Projects by key, with absolute paths.
    pub projects: BTreeMap<ProjectKey, Project>,
    /// Hooks bound to their owning checkout, sorted by project then name.
    pub hooks: Vec<Hook>,
    pub packages: BTreeMap<PackageKey, Package>,
    /// One node per entry manifest.
    pub imports: Vec<ImportNode>,
    /// Import checkouts created or refreshed during resolution.
    pub import_checkouts: Vec<PathBuf>,
}
