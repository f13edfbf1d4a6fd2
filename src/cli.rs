//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use grove::defaults;
use grove::output::OutputConfig;
use grove::workspace::Workspace;

use crate::commands;

/// Grove - Keep a workspace of git checkouts in sync with its manifests
#[derive(Parser, Debug)]
#[command(name = "grove")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    globals: GlobalArgs,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Workspace root. Defaults to the nearest ancestor holding `.grove_root/`.
    #[arg(long, global = true, value_name = "DIR", env = "GROVE_ROOT")]
    pub root: Option<PathBuf>,

    /// Number of projects worked on in parallel.
    #[arg(short, long, global = true, value_name = "N", env = "GROVE_JOBS")]
    pub jobs: Option<usize>,

    /// Number of times an update is attempted when it fails transiently.
    #[arg(
        long,
        global = true,
        value_name = "N",
        default_value_t = defaults::DEFAULT_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub attempts: u32,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    pub color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Shorthand for `--log-level debug`
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// The workspace enclosing the current directory (or `--root`).
    pub fn workspace(&self) -> Result<Workspace> {
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        let root = Workspace::find_root(self.root.as_deref(), &cwd)?;
        Ok(self.configure(Workspace::new(root)))
    }

    /// Applies the job and attempt settings to `ws`.
    pub fn configure(&self, ws: Workspace) -> Workspace {
        let ws = ws.with_attempts(self.attempts);
        match self.jobs {
            Some(jobs) if jobs > 0 => ws.with_jobs(jobs),
            _ => ws,
        }
    }

    pub fn output(&self) -> OutputConfig {
        OutputConfig::from_env_and_flag(&self.color)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            root: None,
            jobs: None,
            attempts: 1,
            color: "never".to_string(),
            log_level: "info".to_string(),
            verbose: false,
        }
    }

    fn init_logging(&self) {
        let level = if self.verbose {
            "debug"
        } else {
            self.log_level.as_str()
        };
        let env = env_logger::Env::default().default_filter_or(level);
        // A second initialization only happens in tests driving `execute`.
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp(None)
            .try_init();
    }
}

/// Converts a `--hook-timeout` value in minutes.
pub fn hook_timeout(minutes: Option<u64>) -> Option<Duration> {
    minutes.map(|m| Duration::from_secs(m * 60))
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new workspace
    Init(commands::init::InitArgs),

    /// Add a remote manifest import to the workspace manifest
    Import(commands::import::ImportArgs),

    /// Bring every checkout in line with the manifests
    Update(commands::update::UpdateArgs),

    /// Run the hooks declared by the manifests
    RunHooks(commands::run_hooks::RunHooksArgs),

    /// Generate a lockfile pinning every project and package
    Resolve(commands::resolve::ResolveArgs),

    /// Run a command in several projects in parallel
    Runp(commands::runp::RunpArgs),

    /// List the checkouts in the workspace
    List(commands::list::ListArgs),

    /// Write a manifest pinning every checkout at its current revision
    Snapshot(commands::snapshot::SnapshotArgs),

    /// Display the manifest import tree
    Tree(commands::tree::TreeArgs),

    /// Push the current change for code review
    Upload(commands::upload::UploadArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        self.globals.init_logging();
        let globals = &self.globals;

        match self.command {
            Commands::Init(args) => commands::init::execute(args, globals),
            Commands::Import(args) => commands::import::execute(args, globals),
            Commands::Update(args) => commands::update::execute(args, globals),
            Commands::RunHooks(args) => commands::run_hooks::execute(args, globals),
            Commands::Resolve(args) => commands::resolve::execute(args, globals),
            Commands::Runp(args) => commands::runp::execute(args, globals),
            Commands::List(args) => commands::list::execute(args, globals),
            Commands::Snapshot(args) => commands::snapshot::execute(args, globals),
            Commands::Tree(args) => commands::tree::execute(args, globals),
            Commands::Upload(args) => commands::upload::execute(args, globals),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
