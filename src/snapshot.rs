//! Snapshots: manifests that pin every project at an exact revision.
//!
//! The same format serves two purposes. `grove snapshot` records the current
//! state of a workspace so it can be reproduced later, and every update
//! leaves one under `.grove_root/update_history/latest.yaml` listing the
//! checkouts it left behind, which the fast scan path reads back.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::manifest::Manifest;
use crate::project::{LocalProject, Project};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub manifest: Manifest,
}

impl Snapshot {
    /// Snapshot of `projects` as declared, with paths relative to `root`.
    pub fn from_projects<'p>(root: &Path, projects: impl IntoIterator<Item = &'p Project>) -> Self {
        let mut list: Vec<Project> = projects.into_iter().map(|p| p.relative_to(root)).collect();
        list.sort_by(|a, b| a.key().cmp(&b.key()));
        Self {
            manifest: Manifest {
                projects: list,
                ..Manifest::default()
            },
        }
    }

    /// Snapshot pinning each checkout at its current HEAD.
    pub fn from_local(root: &Path, local: &[LocalProject]) -> Self {
        let pinned: Vec<Project> = local
            .iter()
            .map(|l| {
                let mut p = l.project.clone();
                p.revision = Some(l.revision.clone());
                p
            })
            .collect();
        Self::from_projects(root, &pinned)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self {
            manifest: Manifest::from_file(path)?,
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.manifest.to_yaml()
    }

    /// Writes the snapshot atomically, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, self.to_yaml()?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
