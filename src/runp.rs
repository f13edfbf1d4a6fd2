//! # Parallel Command Runner
//!
//! Runs one shell command in many checkouts at once.
//!
//! Projects are selected up front by a [`ProjectFilter`]. The command then
//! runs on a [`WorkerPool`] of `jobs` workers, one subprocess per project,
//! with the project checkout as working directory and an environment built
//! by [`crate::envvar::merge`].
//!
//! Output is handled in one of three modes:
//!
//! - **Collate**: each project's output is buffered and written in one piece
//!   when its command exits.
//! - **Prefix**: output is streamed line by line, each line prefixed with the
//!   project name or key. Stdout and stderr stay separate.
//! - **Interactive**: the command inherits the terminal. Only one command
//!   runs at a time.
//!
//! With `exit_on_error`, the first failing command raises a shared
//! cancellation flag: running commands are terminated and commands that have
//! not started yet are skipped.

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use regex::Regex;

use crate::defaults;
use crate::envvar::{self, MergePolicies};
use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::process::{self, WaitOutcome};
use crate::project::{LocalProject, ProjectKey};
use crate::repository::VersionControl;
use crate::workspace::{ProjectLocation, Workspace};

/// What identifies a project in prefixed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixKind {
    Name,
    Key,
}

/// How command output reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Collate,
    Prefix(PrefixKind),
    Interactive,
}

/// Predicates selecting the projects a command runs in.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Keep projects with a local branch matching this expression.
    pub has_branch: Option<Regex>,
    /// Keep projects whose name or key matches this expression.
    pub projects: Option<Regex>,
    /// `Some(true)` keeps projects with uncommitted changes, `Some(false)`
    /// those without.
    pub uncommitted: Option<bool>,
    /// Same as `uncommitted`, for untracked files.
    pub untracked: Option<bool>,
}

impl ProjectFilter {
    pub fn is_empty(&self) -> bool {
        self.has_branch.is_none()
            && self.projects.is_none()
            && self.uncommitted.is_none()
            && self.untracked.is_none()
    }

    /// Whether dirty state has to be scanned to apply this filter.
    pub fn needs_dirty_state(&self) -> bool {
        self.uncommitted.is_some() || self.untracked.is_some()
    }

    /// Selects the matching projects out of `local`.
    ///
    /// An empty filter selects every project, except when `current` is a
    /// checkout on a branch: then the projects on that same branch are
    /// selected.
    pub fn select(
        &self,
        local: &[LocalProject],
        current: Option<&LocalProject>,
        vcs: &dyn VersionControl,
    ) -> Result<Vec<LocalProject>> {
        if self.is_empty() {
            if let Some(branch) = current.and_then(|c| c.branch.as_deref()) {
                log::debug!("selecting projects on branch {}", branch);
                return Ok(local
                    .iter()
                    .filter(|l| l.branch.as_deref() == Some(branch))
                    .cloned()
                    .collect());
            }
            return Ok(local.to_vec());
        }

        let mut selected = Vec::new();
        for l in local {
            if let Some(re) = &self.projects {
                if !re.is_match(&l.project.name) && !re.is_match(&l.key().to_string()) {
                    continue;
                }
            }
            if let Some(want) = self.uncommitted {
                if l.dirty != Some(want) {
                    continue;
                }
            }
            if let Some(want) = self.untracked {
                if l.untracked != Some(want) {
                    continue;
                }
            }
            if let Some(re) = &self.has_branch {
                let branches = vcs.branches(l.path())?;
                if !branches.iter().any(|b| re.is_match(b)) {
                    continue;
                }
            }
            selected.push(l.clone());
        }
        Ok(selected)
    }
}

/// The checkout containing `cwd`, looked up among `local`.
pub fn current_project<'l>(
    ws: &Workspace,
    local: &'l [LocalProject],
    cwd: &Path,
) -> Option<&'l LocalProject> {
    match ws.find_project(cwd) {
        ProjectLocation::Found(p) => local.iter().find(|l| l.path() == p.path),
        ProjectLocation::NotFound => None,
    }
}

/// Options for one `runp` invocation.
#[derive(Debug, Clone)]
pub struct RunpOptions {
    pub command: String,
    pub shell: String,
    /// Environment the merge starts from.
    pub base_env: BTreeMap<String, String>,
    pub overrides: Vec<(String, String)>,
    pub policies: MergePolicies,
    pub mode: OutputMode,
    pub exit_on_error: bool,
    pub jobs: usize,
}

impl RunpOptions {
    /// Options running `command` through `$SHELL` (or `sh`) with the process
    /// environment and the default merge policies.
    pub fn new(command: impl Into<String>) -> Result<Self> {
        Ok(Self {
            command: command.into(),
            shell: std::env::var("SHELL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "sh".to_string()),
            base_env: envvar::process_env(),
            overrides: Vec::new(),
            policies: defaults::DEFAULT_MERGE_POLICIES.parse()?,
            mode: OutputMode::Collate,
            exit_on_error: false,
            jobs: defaults::default_jobs(),
        })
    }
}

/// How the command ended in one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Finished(WaitOutcome),
    /// Not started because of an earlier failure.
    Skipped,
    /// The command could not be started.
    SpawnFailed(String),
}

impl RunStatus {
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Finished(o) if o.success())
    }

    fn describe(&self) -> String {
        match self {
            RunStatus::Finished(WaitOutcome::Exited(status)) => process::describe(status),
            RunStatus::Finished(WaitOutcome::TimedOut) => "timed out".to_string(),
            RunStatus::Finished(WaitOutcome::Cancelled) => "cancelled".to_string(),
            RunStatus::Skipped => "skipped".to_string(),
            RunStatus::SpawnFailed(e) => format!("could not start: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectRun {
    pub key: ProjectKey,
    pub path: PathBuf,
    pub status: RunStatus,
}

/// Result of running a command across projects.
#[derive(Debug, Clone)]
pub struct RunpOutcome {
    /// One entry per selected project, in selection order.
    pub runs: Vec<ProjectRun>,
    /// Most subprocesses observed alive at the same time.
    pub peak_concurrency: usize,
}

impl RunpOutcome {
    /// Aggregate of every project where the command did not succeed.
    pub fn error(&self) -> Option<Error> {
        let failures = self
            .runs
            .iter()
            .filter(|r| !r.status.success())
            .map(|r| Error::CommandExecution {
                project: r.key.name.clone(),
                status: r.status.describe(),
            })
            .collect::<Vec<_>>();
        Error::aggregate(
            format!("command failed in {} project(s)", failures.len()),
            failures,
        )
    }
}

/// Destination of command output. Writes are serialized.
pub struct OutputSink {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
}

impl OutputSink {
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
        }
    }

    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    fn write(&self, stream: &Mutex<Box<dyn Write + Send>>, bytes: &[u8]) -> Result<()> {
        let mut w = stream.lock().map_err(|_| Error::LockPoisoned {
            context: "runp output".to_string(),
        })?;
        w.write_all(bytes)?;
        w.flush()?;
        Ok(())
    }

    pub fn write_out(&self, bytes: &[u8]) -> Result<()> {
        self.write(&self.out, bytes)
    }

    pub fn write_err(&self, bytes: &[u8]) -> Result<()> {
        self.write(&self.err, bytes)
    }
}

/// Runs commands across projects.
pub struct ParallelRunner<'a> {
    ws: &'a Workspace,
    opts: RunpOptions,
    sink: OutputSink,
    cancel: AtomicBool,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl<'a> ParallelRunner<'a> {
    pub fn new(ws: &'a Workspace, opts: RunpOptions, sink: OutputSink) -> Self {
        Self {
            ws,
            opts,
            sink,
            cancel: AtomicBool::new(false),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Runs the command in every project of `selected`.
    pub fn run(&self, selected: &[LocalProject]) -> Result<RunpOutcome> {
        let jobs = match self.opts.mode {
            OutputMode::Interactive => 1,
            _ => self.opts.jobs,
        };
        let pool = WorkerPool::new(jobs);
        let runs = pool.map(selected.iter().collect::<Vec<_>>(), |l| ProjectRun {
            key: l.key(),
            path: l.path().to_path_buf(),
            status: self.run_one(l),
        })?;
        Ok(RunpOutcome {
            runs,
            peak_concurrency: self.peak.load(Ordering::SeqCst),
        })
    }

    fn run_one(&self, local: &LocalProject) -> RunStatus {
        if self.cancel.load(Ordering::SeqCst) {
            return RunStatus::Skipped;
        }
        let cmd = self.command(local);
        let result = match self.opts.mode {
            OutputMode::Collate => self.run_collated(cmd),
            OutputMode::Prefix(kind) => self.run_prefixed(cmd, &self.prefix(local, kind)),
            OutputMode::Interactive => self.run_interactive(cmd),
        };
        let status = match result {
            Ok(outcome) => RunStatus::Finished(outcome),
            Err(e) => RunStatus::SpawnFailed(e.to_string()),
        };
        if !status.success() && status != RunStatus::Finished(WaitOutcome::Cancelled) {
            log::debug!("{}: {}", local.project.name, status.describe());
            if self.opts.exit_on_error {
                self.cancel.store(true, Ordering::SeqCst);
            }
        }
        status
    }

    fn command(&self, local: &LocalProject) -> Command {
        let mut env = envvar::merge(&self.opts.base_env, &self.opts.overrides, &self.opts.policies);
        env.insert(
            defaults::ROOT_ENV.to_string(),
            self.ws.root.display().to_string(),
        );
        env.insert("GROVE_PROJECT_NAME".to_string(), local.project.name.clone());
        env.insert(
            "GROVE_PROJECT_PATH".to_string(),
            local.path().display().to_string(),
        );
        let mut cmd = Command::new(&self.opts.shell);
        cmd.arg("-c")
            .arg(&self.opts.command)
            .current_dir(local.path())
            .env_clear()
            .envs(env);
        cmd
    }

    fn prefix(&self, local: &LocalProject, kind: PrefixKind) -> String {
        match kind {
            PrefixKind::Name => local.project.name.clone(),
            PrefixKind::Key => local.key().to_string(),
        }
    }

    fn started(&self) {
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn finished(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn run_collated(&self, cmd: Command) -> Result<WaitOutcome> {
        self.started();
        let captured = process::run_captured(cmd, None, Some(&self.cancel));
        self.finished();
        let captured = captured?;
        self.sink.write_out(&captured.stdout)?;
        self.sink.write_err(&captured.stderr)?;
        Ok(captured.outcome)
    }

    fn run_prefixed(&self, mut cmd: Command, prefix: &str) -> Result<WaitOutcome> {
        process::isolate(&mut cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        self.started();
        let out = child.stdout.take();
        let err = child.stderr.take();
        let outcome = thread::scope(|s| {
            let out_stream = s.spawn(|| self.stream_lines(out, prefix, false));
            let err_stream = s.spawn(|| self.stream_lines(err, prefix, true));
            let outcome = process::wait(&mut child, None, Some(&self.cancel), true);
            self.finished();
            for handle in [out_stream, err_stream] {
                if let Ok(Err(e)) = handle.join() {
                    log::debug!("{}: output lost: {}", prefix, e);
                }
            }
            outcome
        });
        Ok(outcome?)
    }

    fn stream_lines<R: Read>(&self, pipe: Option<R>, prefix: &str, is_err: bool) -> Result<()> {
        let Some(pipe) = pipe else {
            return Ok(());
        };
        for line in BufReader::new(pipe).lines() {
            let line = format!("{}: {}\n", prefix, line?);
            if is_err {
                self.sink.write_err(line.as_bytes())?;
            } else {
                self.sink.write_out(line.as_bytes())?;
            }
        }
        Ok(())
    }

    fn run_interactive(&self, mut cmd: Command) -> Result<WaitOutcome> {
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let mut child = cmd.spawn()?;
        self.started();
        let outcome = process::wait(&mut child, None, Some(&self.cancel), false);
        self.finished();
        Ok(outcome?)
    }
}

/// Runs `opts.command` across `selected`, writing to the process's stdio.
pub fn run_across_projects(
    ws: &Workspace,
    selected: &[LocalProject],
    opts: RunpOptions,
) -> Result<RunpOutcome> {
    ParallelRunner::new(ws, opts, OutputSink::stdio()).run(selected)
}
