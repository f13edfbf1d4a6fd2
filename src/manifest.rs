//! # Manifest Documents
//!
//! A manifest is a YAML document listing projects, hooks and packages, plus
//! edges to other manifests:
//!
//! ```yaml
//! imports:
//!   - remote: https://example.com/manifests
//!     manifest: base.yaml
//!     name: manifests
//!     remotebranch: main
//! localimports:
//!   - file: extra.yaml
//! projects:
//!   - name: a
//!     path: src/a
//!     remote: https://example.com/a
//!     revision: 4e1f0c2
//! hooks:
//!   - name: setup
//!     project: a
//!     action: scripts/setup.sh
//! packages:
//!   - name: toolchain
//!     remote: https://example.com/toolchain
//!     path: prebuilt/toolchain
//! ```
//!
//! Unknown fields are rejected so typos surface as errors instead of silently
//! dropped settings. Paths are relative to the workspace root; the resolver
//! makes them absolute.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::project::{Hook, Package, Project};

fn default_import_name() -> String {
    defaults::DEFAULT_IMPORT_NAME.to_string()
}

fn default_branch() -> String {
    defaults::DEFAULT_BRANCH.to_string()
}

/// Edge to a manifest stored in another repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Import {
    pub remote: String,
    /// Manifest file path inside the imported repository.
    pub manifest: PathBuf,
    /// Name of the project created for the import's checkout.
    #[serde(default = "default_import_name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(rename = "remotebranch", default = "default_branch")]
    pub remote_branch: String,
    /// Directory (relative to the workspace root) the import and everything
    /// it declares live under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl Import {
    /// Checkout path of the import relative to the workspace root.
    pub fn checkout_path(&self) -> PathBuf {
        match &self.root {
            Some(root) => root.join(&self.name),
            None => PathBuf::from(&self.name),
        }
    }

    /// The project the import's repository is checked out as.
    pub fn to_project(&self) -> Project {
        let mut project = Project::new(&self.name, self.checkout_path(), &self.remote)
            .with_branch(&self.remote_branch);
        project.revision = self.revision.clone();
        project
    }
}

/// Edge to a manifest file on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalImport {
    /// Path relative to the directory of the importing manifest.
    pub file: PathBuf,
}

/// A parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Import>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localimports: Vec<LocalImport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
}

impl Manifest {
    /// Parses and validates a manifest. `origin` is used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Manifest> {
        if content.trim().is_empty() {
            return Ok(Manifest::default());
        }
        let manifest: Manifest =
            serde_yaml::from_str(content).map_err(|e| Error::ManifestParse {
                path: origin.display().to_string(),
                message: e.to_string(),
                hint: Some(
                    "Top-level sections are imports, localimports, projects, hooks and packages"
                        .to_string(),
                ),
            })?;
        manifest.validate(origin)?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Manifest> {
        let content = fs::read_to_string(path).map_err(|e| Error::ManifestParse {
            path: path.display().to_string(),
            message: format!("cannot read manifest: {}", e),
            hint: None,
        })?;
        Self::parse(&content, path)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    fn validate(&self, origin: &Path) -> Result<()> {
        let err = |message: String, hint: Option<&str>| Error::ManifestParse {
            path: origin.display().to_string(),
            message,
            hint: hint.map(str::to_string),
        };

        for import in &self.imports {
            if import.remote.is_empty() {
                return Err(err("import has an empty remote".to_string(), None));
            }
            if import.manifest.as_os_str().is_empty() {
                return Err(err(
                    format!("import of {} names no manifest file", import.remote),
                    None,
                ));
            }
            check_relative(&import.checkout_path())
                .map_err(|m| err(format!("import {}: {}", import.name, m), None))?;
        }
        for local in &self.localimports {
            if local.file.as_os_str().is_empty() {
                return Err(err("localimport has an empty file".to_string(), None));
            }
        }
        for project in &self.projects {
            if project.name.is_empty() || project.remote.is_empty() {
                return Err(err(
                    format!("project at {} needs a name and a remote", project.path.display()),
                    Some("every project needs name, path and remote"),
                ));
            }
            if project.protocol != defaults::DEFAULT_PROTOCOL {
                return Err(err(
                    format!(
                        "project {} uses unsupported protocol {:?}",
                        project.name, project.protocol
                    ),
                    Some("only \"git\" is supported"),
                ));
            }
            check_relative(&project.path)
                .map_err(|m| err(format!("project {}: {}", project.name, m), None))?;
        }
        for hook in &self.hooks {
            if hook.name.is_empty() || hook.project.is_empty() {
                return Err(err("hook needs a name and a project".to_string(), None));
            }
            if hook.action.is_absolute() {
                return Err(err(
                    format!("hook {} action must be relative to its project", hook.name),
                    None,
                ));
            }
        }
        for package in &self.packages {
            if package.name.is_empty() || package.remote.is_empty() {
                return Err(err("package needs a name and a remote".to_string(), None));
            }
            check_relative(&package.path)
                .map_err(|m| err(format!("package {}: {}", package.name, m), None))?;
        }
        Ok(())
    }
}

/// Checkout paths must stay inside the workspace.
fn check_relative(path: &Path) -> std::result::Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err("path is empty".to_string());
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(format!("path {} must be relative and stay inside the workspace", path.display())),
        }
    }
    Ok(())
}
