//! Ending a session.
//!
//! Every role ends through [`Shutdown`]: it releases what the role owns, at
//! most once, and exits with status 0. A role learns that the session is over
//! from its own work finishing, from a [`ChildWatcher`] noticing that the
//! process it depends on has exited, or from `SIGTERM` sent by a fatal path
//! elsewhere in the process group.

use crate::terminal::RawMode;
use anyhow::{Context as _, Result, anyhow};
use nix::errno::Errno;
use nix::sys::signal::{SigSet, Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use portable_pty::MasterPty;
use std::os::fd::AsFd;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// The fixed responsibility of one process in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Plays the script into the PTY and owns the operator's terminal.
    InputDriver,
    /// Copies PTY output to the operator's terminal.
    OutputRelay,
    /// Runs the shell on the PTY slave.
    ShellRunner,
}

/// Something a role gives up when its session ends.
pub trait Release {
    fn release(self) -> Result<()>;
}

impl<Fd: AsFd> Release for RawMode<Fd> {
    fn release(mut self) -> Result<()> {
        self.restore().map(drop)
    }
}

impl Release for Box<dyn MasterPty + Send> {
    fn release(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}

/// Teardown for one role.
pub struct Shutdown<R: Release> {
    role: Role,
    owned: Option<R>,
}

impl<R: Release> Shutdown<R> {
    pub fn new(role: Role, owned: R) -> Self {
        Shutdown {
            role,
            owned: Some(owned),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Release the role's resources. Only the first call has any effect.
    pub fn release(&mut self) {
        if let Some(owned) = self.owned.take() {
            debug!(role = ?self.role, "releasing session resources");
            if let Err(e) = owned.release() {
                warn!(role = ?self.role, "{e:#}");
            }
        }
    }

    /// Release everything and exit the process with status 0.
    pub fn terminate(mut self) -> ! {
        self.release();
        info!(role = ?self.role, "session over");
        std::process::exit(0)
    }

    /// Report an unrecoverable error, tell the whole process group to stop,
    /// then terminate this role.
    pub fn fatal(self, error: &anyhow::Error) -> ! {
        eprintln!("ttyrun: {error:#}");
        signal_group();
        self.terminate()
    }
}

/// Send `SIGTERM` to every process in our process group.
pub fn signal_group() {
    if let Err(e) = kill(Pid::from_raw(0), Signal::SIGTERM) {
        warn!("failed to signal the process group: {e}");
    }
}

/// Ask one process to end its role.
pub fn signal_role(pid: Pid) {
    if let Err(e) = kill(pid, Signal::SIGTERM) {
        debug!(%pid, "failed to signal role: {e}");
    }
}

fn termination_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    set.add(Signal::SIGTERM);
    set
}

/// Hold back `SIGCHLD` and `SIGTERM` until a role is ready to observe them.
///
/// Called before the first fork; the mask is inherited by every role, which
/// installs its handlers and then calls [`unblock_termination_signals`].
pub fn block_termination_signals() -> Result<()> {
    termination_signals()
        .thread_block()
        .context("Failed to block termination signals")
}

/// Deliver any `SIGCHLD`/`SIGTERM` held back since
/// [`block_termination_signals`].
pub fn unblock_termination_signals() -> Result<()> {
    termination_signals()
        .thread_unblock()
        .context("Failed to unblock termination signals")
}

/// Reap every exited child without blocking. Returns `true` if `pid` was
/// among them or is no longer our child.
pub fn reap(pid: Pid) -> Result<bool> {
    let mut found = false;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return Ok(found),
            Ok(status) => {
                debug!(?status, "reaped child");
                found |= status.pid() == Some(pid);
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return Ok(true),
            Err(e) => return Err(anyhow!(e).context("waitpid failed")),
        }
    }
}

/// Waits for one child process to exit, reaping any others on the way.
pub struct ChildWatcher {
    pid: Pid,
    sigchld: tokio::signal::unix::Signal,
}

impl ChildWatcher {
    /// Start listening for `SIGCHLD`. Must be called inside a tokio runtime.
    pub fn new(pid: Pid) -> Result<Self> {
        let sigchld = signal(SignalKind::child()).context("Failed to listen for SIGCHLD")?;
        Ok(ChildWatcher { pid, sigchld })
    }

    /// Resolve once the watched child has exited.
    ///
    /// Checks immediately, so an exit that happened before the watcher was
    /// installed is not missed.
    pub async fn wait(&mut self) -> Result<()> {
        loop {
            if reap(self.pid)? {
                debug!(pid = %self.pid, "watched child exited");
                return Ok(());
            }
            if self.sigchld.recv().await.is_none() {
                return Err(anyhow!("SIGCHLD stream closed"));
            }
        }
    }
}
