//! # Upload Command Implementation
//!
//! This module implements the `upload` subcommand, which pushes the current
//! branch of a project to its review server as a change for review.
//!
//! ## Functionality
//!
//! - **Single project**: The project enclosing the current directory
//! - **Multipart**: `--multipart` uploads every project that has the branch,
//!   all under one topic
//! - **Rebase**: `--rebase` rebases onto the remote branch before pushing
//! - **Review metadata**: reviewers, CCs, topic and presubmit selection are
//!   encoded in the pushed ref
//!
//! `--branch` always wins over the branch checked out in the current project.

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args};

use grove::defaults;
use grove::error::Error;
use grove::git::FetchOptions;
use grove::output::symbol;
use grove::project::Project;
use grove::repository::{GitVersionControl, VersionControl};
use grove::review::{self, Presubmit, PushOptions};
use grove::scanner::{ProjectScanner, ScanMode};
use grove::workspace::{ProjectLocation, Workspace};

use crate::cli::GlobalArgs;

/// Push the current change for code review
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Upload every project that has the branch.
    #[arg(long)]
    pub multipart: bool,

    /// Rebase onto the remote branch before pushing.
    #[arg(long)]
    pub rebase: bool,

    /// Local branch to upload. Defaults to the current project's branch.
    #[arg(long, value_name = "BRANCH")]
    pub branch: Option<String>,

    /// Review branch on the server. Defaults to the branch the project tracks.
    #[arg(long, value_name = "BRANCH")]
    pub remote_branch: Option<String>,

    /// Comma separated reviewers.
    #[arg(short, long = "reviewers", value_name = "EMAILS")]
    pub reviewers: Option<String>,

    /// Comma separated addresses to CC.
    #[arg(long, value_name = "EMAILS")]
    pub cc: Option<String>,

    /// Topic of the change. Defaults to `<user>-<branch>`.
    #[arg(long, value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Attach a topic to the change.
    #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    pub set_topic: bool,

    /// Presubmit checks to request (all, none).
    #[arg(long, value_name = "KIND", default_value = "all")]
    pub presubmit: String,

    /// Run local pre-push hooks.
    #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    pub verify: bool,

    /// Extra options passed to `git push`, whitespace separated.
    #[arg(long, value_name = "OPTIONS", allow_hyphen_values = true)]
    pub git_options: Option<String>,
}

impl UploadArgs {
    /// Push options shared by every project of this upload.
    fn push_options(&self, branch: &str, user: Option<&str>) -> Result<PushOptions> {
        let topic = match (&self.topic, self.set_topic) {
            (_, false) => None,
            (Some(topic), true) => Some(topic.clone()),
            (None, true) => user.map(|u| format!("{}-{}", u, branch)),
        };
        Ok(PushOptions {
            reviewers: self.reviewers.as_deref().map(review::parse_emails).unwrap_or_default(),
            ccs: self.cc.as_deref().map(review::parse_emails).unwrap_or_default(),
            topic,
            presubmit: self.presubmit.parse::<Presubmit>()?,
            verify: self.verify,
            ref_to_upload: branch.to_string(),
            git_options: self
                .git_options
                .as_deref()
                .map(|o| o.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            ..PushOptions::default()
        })
    }

    fn remote_branch_for(&self, project: &Project) -> String {
        match &self.remote_branch {
            Some(b) => b.clone(),
            None if !project.remote_branch.is_empty() => project.remote_branch.clone(),
            None => defaults::DEFAULT_BRANCH.to_string(),
        }
    }
}

/// Execute the `upload` command.
pub fn execute(args: UploadArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let vcs = GitVersionControl;
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let current = match ws.find_project(&cwd) {
        ProjectLocation::Found(p) => p,
        ProjectLocation::NotFound => bail!("{} is not inside a grove project", cwd.display()),
    };

    let branch = match &args.branch {
        Some(b) => b.clone(),
        None => vcs
            .current_branch(&current.path)?
            .ok_or_else(|| anyhow!("{} is not on a branch; pass --branch", current.name))?,
    };
    let projects = if args.multipart {
        projects_with_branch(&ws, &vcs, &branch)?
    } else {
        vec![current]
    };
    if projects.is_empty() {
        bail!("no project has a branch named {}", branch);
    }

    let user = std::env::var("USER").ok();
    let base = args.push_options(&branch, user.as_deref())?;
    let output = globals.output();
    let mut errors = Vec::new();
    for project in &projects {
        let opts = PushOptions {
            remote_branch: args.remote_branch_for(project),
            ..base.clone()
        };
        match upload_one(&vcs, project, &opts, args.rebase) {
            Ok(result) => {
                let note = if result.no_new_changes {
                    " (no new changes)"
                } else {
                    ""
                };
                println!(
                    "{} {}: uploaded {} to {}{}",
                    symbol(&output, "✔", "[OK]"),
                    project.name,
                    branch,
                    opts.remote_branch,
                    note
                );
            }
            Err(e) => {
                log::error!("{}: {}", project.name, e);
                errors.push(Error::Project {
                    project: project.name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    match Error::aggregate("upload failed", errors) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn projects_with_branch(
    ws: &Workspace,
    vcs: &dyn VersionControl,
    branch: &str,
) -> Result<Vec<Project>> {
    let mut selected = Vec::new();
    for l in ProjectScanner::new(ws, vcs).scan(ScanMode::Fast, &[])? {
        if vcs.branches(l.path())?.iter().any(|b| b == branch) {
            selected.push(l.project);
        }
    }
    Ok(selected)
}

fn upload_one(
    vcs: &dyn VersionControl,
    project: &Project,
    opts: &PushOptions,
    rebase: bool,
) -> grove::error::Result<review::PushResult> {
    if rebase {
        vcs.fetch(
            &project.path,
            &FetchOptions {
                remote: opts.remote.clone(),
                ..FetchOptions::default()
            },
        )?;
        vcs.rebase(&project.path, &format!("{}/{}", opts.remote, opts.remote_branch))?;
    }
    review::push(&project.path, opts)
}
