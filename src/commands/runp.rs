//! # Runp Command Implementation
//!
//! This module implements the `runp` subcommand, which runs a shell command
//! in several projects at once.
//!
//! ## Functionality
//!
//! - **Selection**: `--projects`, `--has-branch`, `--uncommitted` and
//!   `--untracked` filters; with none given and the current directory inside
//!   a project on a branch, the projects on that branch are selected
//! - **Output**: collated per project (default), streamed with a name or key
//!   prefix, or passed through to the terminal with `--interactive`
//! - **Environment**: `--env KEY=VALUE` overrides merged into the caller's
//!   environment under `--merge-policies`
//! - **Cancellation**: `--exit-on-error` stops the remaining commands after
//!   the first failure

use anyhow::{Context, Result};
use clap::Args;
use regex::Regex;

use grove::defaults;
use grove::envvar::{self, MergePolicies};
use grove::repository::GitVersionControl;
use grove::runp::{self, OutputMode, PrefixKind, ProjectFilter, RunpOptions};
use grove::scanner::{ProjectScanner, ScanMode};

use crate::cli::GlobalArgs;

/// Run a command in several projects in parallel
#[derive(Args, Debug, Default)]
pub struct RunpArgs {
    /// Command to run; joined with spaces and passed to the shell.
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,

    /// Only projects whose name or key matches this regular expression.
    #[arg(long, value_name = "REGEX")]
    pub projects: Option<String>,

    /// Only projects with a local branch matching this regular expression.
    #[arg(long, value_name = "REGEX")]
    pub has_branch: Option<String>,

    /// Only projects with uncommitted changes.
    #[arg(long, conflicts_with = "no_uncommitted")]
    pub uncommitted: bool,

    /// Only projects without uncommitted changes.
    #[arg(long)]
    pub no_uncommitted: bool,

    /// Only projects with untracked files.
    #[arg(long, conflicts_with = "no_untracked")]
    pub untracked: bool,

    /// Only projects without untracked files.
    #[arg(long)]
    pub no_untracked: bool,

    /// Run one command at a time, attached to the terminal.
    #[arg(long, conflicts_with_all = ["show_name_prefix", "show_key_prefix"])]
    pub interactive: bool,

    /// Stream output with each line prefixed by the project name.
    #[arg(long, conflicts_with = "show_key_prefix")]
    pub show_name_prefix: bool,

    /// Stream output with each line prefixed by the project key.
    #[arg(long)]
    pub show_key_prefix: bool,

    /// Stop the remaining commands after the first failure.
    #[arg(long)]
    pub exit_on_error: bool,

    /// Environment override, repeatable.
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// How overrides combine with the existing environment.
    #[arg(long, value_name = "POLICIES", default_value = defaults::DEFAULT_MERGE_POLICIES)]
    pub merge_policies: String,
}

impl RunpArgs {
    fn filter(&self) -> Result<ProjectFilter> {
        let compile = |re: &Option<String>| -> Result<Option<Regex>> {
            re.as_deref()
                .map(|r| Regex::new(r).with_context(|| format!("bad regular expression {:?}", r)))
                .transpose()
        };
        let tristate = |yes: bool, no: bool| match (yes, no) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        Ok(ProjectFilter {
            has_branch: compile(&self.has_branch)?,
            projects: compile(&self.projects)?,
            uncommitted: tristate(self.uncommitted, self.no_uncommitted),
            untracked: tristate(self.untracked, self.no_untracked),
        })
    }

    fn mode(&self) -> OutputMode {
        if self.interactive {
            OutputMode::Interactive
        } else if self.show_key_prefix {
            OutputMode::Prefix(PrefixKind::Key)
        } else if self.show_name_prefix {
            OutputMode::Prefix(PrefixKind::Name)
        } else {
            OutputMode::Collate
        }
    }

    fn options(&self, jobs: usize) -> Result<RunpOptions> {
        let mut opts = RunpOptions::new(self.command.join(" "))?;
        opts.overrides = envvar::parse_assignments(&self.env)?;
        opts.policies = self.merge_policies.parse::<MergePolicies>()?;
        opts.mode = self.mode();
        opts.exit_on_error = self.exit_on_error;
        opts.jobs = jobs;
        Ok(opts)
    }
}

/// Execute the `runp` command.
pub fn execute(args: RunpArgs, globals: &GlobalArgs) -> Result<()> {
    let ws = globals.workspace()?;
    let vcs = GitVersionControl;
    let filter = args.filter()?;
    let opts = args.options(ws.jobs)?;

    let local = ProjectScanner::new(&ws, &vcs)
        .with_dirty_check(filter.needs_dirty_state())
        .scan(ScanMode::Fast, &[])?;
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let current = runp::current_project(&ws, &local, &cwd);
    let selected = filter.select(&local, current, &vcs)?;
    if selected.is_empty() {
        log::warn!("no projects selected");
        return Ok(());
    }
    log::debug!("running {:?} in {} projects", opts.command, selected.len());

    let outcome = runp::run_across_projects(&ws, &selected, opts)?;
    match outcome.error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunpArgs,
    }

    fn parse(argv: &[&str]) -> RunpArgs {
        let mut full = vec!["runp"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_command_keeps_hyphenated_words() {
        let args = parse(&["--exit-on-error", "git", "status", "-s"]);
        assert_eq!(args.command.join(" "), "git status -s");
        assert!(args.exit_on_error);
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(parse(&["true"]).mode(), OutputMode::Collate);
        assert_eq!(
            parse(&["--show-key-prefix", "true"]).mode(),
            OutputMode::Prefix(PrefixKind::Key)
        );
        assert_eq!(parse(&["--interactive", "true"]).mode(), OutputMode::Interactive);
        assert!(Harness::try_parse_from(["runp", "--interactive", "--show-name-prefix", "x"]).is_err());
    }

    #[test]
    fn test_filter_tristates() {
        let f = parse(&["--no-uncommitted", "--untracked", "true"]).filter().unwrap();
        assert_eq!(f.uncommitted, Some(false));
        assert_eq!(f.untracked, Some(true));
        assert!(parse(&["true"]).filter().unwrap().is_empty());
    }

    #[test]
    fn test_bad_inputs_are_rejected() {
        assert!(parse(&["--projects", "(", "true"]).filter().is_err());
        assert!(parse(&["--env", "NOEQUALS", "true"]).options(1).is_err());
        assert!(parse(&["--merge-policies", "+", "true"]).options(1).is_err());
    }

    #[test]
    fn test_options_carry_env_and_jobs() {
        let opts = parse(&["-e", "CFLAGS=-g", "make"]).options(3).unwrap();
        assert_eq!(opts.command, "make");
        assert_eq!(opts.jobs, 3);
        assert_eq!(opts.overrides, vec![("CFLAGS".to_string(), "-g".to_string())]);
    }
}
