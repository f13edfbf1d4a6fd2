//! # Projects, Hooks and Packages
//!
//! The data model shared by the manifest reader, the resolver and the sync
//! engine.
//!
//! A [`Project`] is one git checkout the workspace manages. Its identity is a
//! [`ProjectKey`] made of the project name and its remote URL; two manifest
//! entries with the same key describe the same checkout. After resolution
//! every `Project::path` is absolute; the on-disk forms (metadata, snapshots,
//! manifests) store paths relative to the workspace root.
//!
//! Each managed checkout carries a metadata file at
//! `<path>/.git/grove/metadata.json` recording the project it was created for.
//! The scanner uses it to recognize checkouts without consulting the
//! manifest.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::repository::CheckoutTarget;

/// Separator between the two halves of a rendered [`ProjectKey`].
pub const KEY_SEPARATOR: char = '=';

/// Stable identity of a project: `(name, remote)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectKey {
    pub name: String,
    pub remote: String,
}

impl ProjectKey {
    pub fn new(name: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: remote.into(),
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, KEY_SEPARATOR, self.remote)
    }
}

fn default_protocol() -> String {
    defaults::DEFAULT_PROTOCOL.to_string()
}

fn default_branch() -> String {
    defaults::DEFAULT_BRANCH.to_string()
}

fn is_default_protocol(p: &str) -> bool {
    p == defaults::DEFAULT_PROTOCOL
}

fn is_default_branch(b: &str) -> bool {
    b == defaults::DEFAULT_BRANCH
}

/// A git checkout managed by the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub remote: String,
    #[serde(default = "default_protocol", skip_serializing_if = "is_default_protocol")]
    pub protocol: String,
    /// Pinned revision. When absent the project tracks `remote_branch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(
        rename = "remotebranch",
        default = "default_branch",
        skip_serializing_if = "is_default_branch"
    )]
    pub remote_branch: String,
    #[serde(rename = "gerrithost", default, skip_serializing_if = "Option::is_none")]
    pub gerrit_host: Option<String>,
    /// Directory (relative to the workspace root) of hook scripts to install
    /// into `.git/hooks`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub githooks: Option<PathBuf>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            remote: remote.into(),
            protocol: default_protocol(),
            revision: None,
            remote_branch: default_branch(),
            gerrit_host: None,
            githooks: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.remote_branch = branch.into();
        self
    }

    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.name, &self.remote)
    }

    pub fn is_pinned(&self) -> bool {
        self.revision.is_some()
    }

    /// What the checkout should point at: the pin if set, else the branch.
    pub fn checkout_target(&self) -> CheckoutTarget {
        match &self.revision {
            Some(rev) => CheckoutTarget::Revision(rev.clone()),
            None => CheckoutTarget::Branch(self.remote_branch.clone()),
        }
    }

    /// Upstream ref the project follows when tracking a branch.
    pub fn upstream(&self) -> String {
        format!("{}/{}", defaults::REMOTE_NAME, self.remote_branch)
    }

    /// Copy with `path` (and `githooks`) made relative to `root`.
    pub fn relative_to(&self, root: &Path) -> Project {
        let mut p = self.clone();
        if let Ok(rel) = self.path.strip_prefix(root) {
            p.path = rel.to_path_buf();
        }
        if let Some(hooks) = &self.githooks {
            if let Ok(rel) = hooks.strip_prefix(root) {
                p.githooks = Some(rel.to_path_buf());
            }
        }
        p
    }

    /// Copy with `path` (and `githooks`) anchored at `root`.
    pub fn absolute_in(&self, root: &Path) -> Project {
        let mut p = self.clone();
        p.path = root.join(&self.path);
        p.githooks = self.githooks.as_ref().map(|h| root.join(h));
        p
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.path.join(defaults::PROJECT_META_DIR)
    }

    pub fn metadata_file(&self) -> PathBuf {
        metadata_file(&self.path)
    }
}

/// Stable identity of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageKey {
    pub name: String,
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn default_package_version() -> String {
    defaults::DEFAULT_PACKAGE_VERSION.to_string()
}

/// A versioned artifact fetched into the workspace without history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    pub name: String,
    pub remote: String,
    pub path: PathBuf,
    /// Reference to fetch when no instance id is pinned.
    #[serde(default = "default_package_version")]
    pub version: String,
    /// Exact commit identifying the package contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl Package {
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
        }
    }
}

/// A named script shipped inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hook {
    pub name: String,
    /// Name of the project that owns the script.
    pub project: String,
    /// Script path relative to the owning project's checkout.
    pub action: PathBuf,
    /// Owning project's checkout, filled in by the resolver.
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Hook {
    pub fn key(&self) -> (String, String) {
        (self.project.clone(), self.name.clone())
    }

    /// Absolute path of the script once the hook is bound.
    pub fn action_path(&self) -> PathBuf {
        self.dir.join(&self.action)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

/// Observed state of a checkout on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProject {
    /// The project recorded in the checkout's metadata, with an absolute path
    /// reflecting where the checkout actually is.
    pub project: Project,
    /// Current HEAD commit.
    pub revision: String,
    /// Checked-out branch, `None` when detached.
    pub branch: Option<String>,
    /// Uncommitted changes, when requested by the scan.
    pub dirty: Option<bool>,
    /// Untracked files present, when requested by the scan.
    pub untracked: Option<bool>,
}

impl LocalProject {
    pub fn key(&self) -> ProjectKey {
        self.project.key()
    }

    pub fn path(&self) -> &Path {
        &self.project.path
    }
}

/// On-disk metadata record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Metadata {
    version: u32,
    project: Project,
}

const METADATA_VERSION: u32 = 1;

/// Path of the metadata file for a checkout at `dir`.
pub fn metadata_file(dir: &Path) -> PathBuf {
    dir.join(defaults::PROJECT_META_DIR)
        .join(defaults::PROJECT_METADATA_FILE)
}

/// Records `project` in its checkout. Paths are stored relative to `root`.
pub fn write_metadata(project: &Project, root: &Path) -> Result<()> {
    fs::create_dir_all(project.metadata_dir())?;
    let record = Metadata {
        version: METADATA_VERSION,
        project: project.relative_to(root),
    };
    let json = serde_json::to_string_pretty(&record)?;
    let target = project.metadata_file();
    let tmp = target.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, &target)?;
    Ok(())
}

/// Reads the metadata of the checkout at `dir`, anchoring paths at `root`.
///
/// The returned project's path is `dir` itself, so a checkout that was moved
/// by hand is reported where it actually lives.
pub fn read_metadata(dir: &Path, root: &Path) -> Result<Project> {
    let file = metadata_file(dir);
    let content = fs::read_to_string(&file)?;
    let record: Metadata = serde_json::from_str(&content).map_err(|e| Error::Project {
        project: dir.display().to_string(),
        message: format!("unreadable metadata {}: {}", file.display(), e),
    })?;
    let mut project = record.project.absolute_in(root);
    project.path = dir.to_path_buf();
    Ok(project)
}

/// Copies the scripts in `project.githooks` into the checkout's `.git/hooks`.
pub fn install_githooks(project: &Project) -> Result<()> {
    let Some(source) = &project.githooks else {
        return Ok(());
    };
    if !source.is_dir() {
        log::warn!(
            "githooks directory {} for {} does not exist",
            source.display(),
            project.name
        );
        return Ok(());
    }
    let target = project.path.join(".git").join("hooks");
    fs::create_dir_all(&target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let dest = target.join(entry.file_name());
            fs::copy(entry.path(), &dest)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))?;
            }
        }
    }
    Ok(())
}
