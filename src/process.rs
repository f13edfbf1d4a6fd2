//! Subprocess supervision: deadlines, cancellation and termination.
//!
//! Hooks and `runp` commands are external programs. Waiting on them polls
//! for completion so that a deadline or a shared cancellation flag can cut
//! the wait short; the child is then asked to stop with SIGTERM and killed
//! if it is still alive after a grace period.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crate::defaults::{POLL_INTERVAL, TERMINATE_GRACE};

/// How a supervised wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    /// The deadline passed; the child was terminated.
    TimedOut,
    /// The cancellation flag was raised; the child was terminated.
    Cancelled,
}

impl WaitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, WaitOutcome::Exited(s) if s.success())
    }
}

/// Output of a supervised run with captured streams.
#[derive(Debug)]
pub struct Captured {
    pub outcome: WaitOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    /// Stdout followed by stderr, lossily decoded.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// Puts the child in its own process group so termination reaches any
/// processes it spawns. Not for interactive children, which need the
/// terminal's foreground group.
pub fn isolate(cmd: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Waits for `child`, terminating it when `deadline` passes or `cancel` is
/// raised. `group` says whether the child leads its own process group.
pub fn wait(
    child: &mut Child,
    deadline: Option<Instant>,
    cancel: Option<&AtomicBool>,
    group: bool,
) -> io::Result<WaitOutcome> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(WaitOutcome::Exited(status));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            terminate(child, group)?;
            return Ok(WaitOutcome::TimedOut);
        }
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            terminate(child, group)?;
            return Ok(WaitOutcome::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Asks the child to stop, then kills it after the grace period.
pub fn terminate(child: &mut Child, group: bool) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }
    if signal_terminate(child, group).is_ok() {
        let grace_end = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < grace_end {
            if child.try_wait()?.is_some() {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
    log::debug!("killing process {}", child.id());
    match child.kill() {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
        Err(e) => return Err(e),
    }
    child.wait()?;
    Ok(())
}

#[cfg(unix)]
fn signal_terminate(child: &Child, group: bool) -> io::Result<()> {
    let pid = child.id() as libc::pid_t;
    let target = if group { -pid } else { pid };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(target, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn signal_terminate(_child: &Child, _group: bool) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "no SIGTERM"))
}

/// Spawns `cmd` with piped output in its own process group and waits for it
/// under the given deadline and cancellation flag.
pub fn run_captured(
    mut cmd: Command,
    deadline: Option<Instant>,
    cancel: Option<&AtomicBool>,
) -> io::Result<Captured> {
    isolate(&mut cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_reader = thread::spawn(move || drain(stdout));
    let err_reader = thread::spawn(move || drain(stderr));
    let outcome = wait(&mut child, deadline, cancel, true)?;
    let stdout = out_reader.join().unwrap_or_default();
    let stderr = err_reader.join().unwrap_or_default();
    Ok(Captured {
        outcome,
        stdout,
        stderr,
    })
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// Human readable description of an exit status.
pub fn describe(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {}", signal);
        }
    }
    "terminated".to_string()
}
