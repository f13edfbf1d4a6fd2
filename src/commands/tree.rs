//! # Tree Command Implementation
//!
//! This module implements the `tree` subcommand, which displays the manifest
//! import graph of the workspace in a hierarchical format.
//!
//! ## Functionality
//!
//! - **Import Tree Visualization**: One node per manifest, children are its
//!   imports and local imports
//! - **Depth Control**: Supports `--depth` flag to limit tree depth
//! - **Shared Imports**: A manifest reached a second time is marked
//!   `(repeated)` and not expanded again

use anyhow::{Context, Result};
use clap::Args;
use ptree::{print_tree, TreeItem};

use grove::phases::resolve::{resolve_workspace, ResolveOptions};
use grove::phases::ImportNode;
use grove::repository::GitVersionControl;

use crate::cli::GlobalArgs;

/// Display the manifest import tree
#[derive(Args, Debug, Default)]
pub struct TreeArgs {
    /// Maximum depth to display in the tree.
    ///
    /// If not specified, displays the full tree.
    /// Use 0 to show only the workspace manifest, 1 to show its direct imports, etc.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,

    /// Use manifest checkouts as they are on disk instead of fetching them.
    #[arg(long)]
    pub local_manifest: bool,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let opts = ResolveOptions {
        local_manifest: args.local_manifest,
        ..ResolveOptions::default()
    };
    let resolved = resolve_workspace(&ws, &GitVersionControl, opts)
        .context("Failed to resolve the import tree")?;

    let max_depth = args.depth.unwrap_or(usize::MAX);
    for root in &resolved.imports {
        let node = build_tree_node(root, max_depth, 0);
        print_tree(&node).context("Failed to display tree")?;
    }
    Ok(())
}

/// Build a tree node from an import node
fn build_tree_node(import: &ImportNode, max_depth: usize, current_depth: usize) -> TreeNode {
    let label = if import.repeated {
        format!("{} (repeated)", import.label)
    } else {
        import.label.clone()
    };
    let children = if current_depth >= max_depth {
        Vec::new()
    } else {
        import
            .children
            .iter()
            .map(|child| build_tree_node(child, max_depth, current_depth + 1))
            .collect()
    };
    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
