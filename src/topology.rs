//! Process layout of a session.
//!
//! ```text
//! root ── fork ──┬── InputDriver  (root continues: plays the script)
//!                └── OutputRelay  (copies PTY output to the terminal)
//!                        └── spawn ── ShellRunner (the shell on the PTY slave)
//! ```
//!
//! Each role keeps only the descriptors it needs: the input driver keeps a
//! writer on the PTY master and the operator's terminal, the output relay keeps
//! the PTY master, and the shell gets the slave as its standard streams and
//! controlling terminal.

use crate::config::{RuntimeFlags, SessionConfig};
use crate::engine::{Interpreter, Outcome};
use crate::pacing::TokioPacer;
use crate::relay::copy_output;
use crate::session::Session;
use crate::shutdown::{self, ChildWatcher, Role, Shutdown};
use crate::terminal::{RawMode, TerminalState, master_writer};
use anyhow::{Context as _, Result, anyhow};
use nix::unistd::{ForkResult, Pid, fork};
use portable_pty::{Child, CommandBuilder, PtyPair, SlavePty};
use std::convert::Infallible;
use std::fs::File;
use std::io::{Read, Stdin};
use tokio::runtime::Runtime;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// What ended a role's main loop.
#[derive(Debug)]
enum Ended {
    /// The script was played to the end or the operator exited.
    Playback(Outcome),
    /// The PTY master reported end of file.
    PtyClosed,
    /// The process this role depends on exited.
    ChildExited,
    /// `SIGTERM` arrived.
    Terminated,
    /// The role's work failed part way through.
    Failed(anyhow::Error),
}

/// Run a session. Only returns if setup fails before any role exists.
///
/// The script is read and the terminal captured before anything else, so a
/// missing script or a non-terminal stdin fails without touching the terminal.
/// Errors returned from here (unreadable script, no terminal, no free PTY,
/// raw mode refused) do not signal the process group: there is no other role
/// to stop yet, and the caller may share the group.
pub fn launch(config: SessionConfig) -> Result<Infallible> {
    let session = Session::load(&config.script)?;
    debug!(lines = session.len(), script = %config.script.display(), "script loaded");

    let terminal = TerminalState::capture(std::io::stdin())?;
    let pty = terminal.acquire_pty()?;

    shutdown::block_termination_signals()?;
    let raw = terminal.enter_raw_mode(std::io::stdin())?;

    assign_roles(config, session, pty, raw)
}

/// Split into the input driver and the output relay.
fn assign_roles(
    config: SessionConfig,
    session: Session,
    pty: PtyPair,
    raw: RawMode<Stdin>,
) -> ! {
    let input = Shutdown::new(Role::InputDriver, raw);

    // SAFETY: no threads have been started yet, and each branch builds its own
    // runtime after the fork.
    match unsafe { fork() } {
        Err(e) => input.fatal(&anyhow!(e).context("fork failed")),
        Ok(ForkResult::Parent { child }) => input_driver(config.flags, &session, pty, input, child),
        Ok(ForkResult::Child) => {
            // Terminal attributes belong to the input driver.
            drop(input);
            drop(session);
            output_relay(&config, pty)
        }
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

fn input_driver(
    flags: RuntimeFlags,
    session: &Session,
    pty: PtyPair,
    shutdown: Shutdown<RawMode<Stdin>>,
    relay: Pid,
) -> ! {
    let PtyPair { master, slave } = pty;
    drop(slave);
    let writer = match master_writer(master.as_ref()) {
        Ok(writer) => writer,
        Err(e) => shutdown.fatal(&e),
    };
    drop(master);

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(e) => shutdown.fatal(&e),
    };
    info!(%relay, "input driver started");

    match runtime.block_on(drive_input(flags, session, writer, relay)) {
        Err(e) => shutdown.fatal(&e),
        Ok(ended) => {
            info!(role = ?shutdown.role(), ?ended, "ending session");
            match &ended {
                Ended::Playback(Outcome::Exited) => info!("operator ended the session"),
                Ended::Playback(Outcome::Completed) => info!("keyboard closed"),
                Ended::Failed(e) => warn!("{e:#}"),
                Ended::PtyClosed | Ended::ChildExited | Ended::Terminated => {}
            }
            if matches!(ended, Ended::Playback(_) | Ended::Failed(_)) {
                // The relay would otherwise keep the shell alive.
                shutdown::signal_role(relay);
            }
            shutdown.terminate()
        }
    }
}

async fn drive_input(
    flags: RuntimeFlags,
    session: &Session,
    shell: File,
    relay: Pid,
) -> Result<Ended> {
    let mut relay_exit = ChildWatcher::new(relay)?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    shutdown::unblock_termination_signals()?;

    let mut interpreter = Interpreter::new(tokio::io::stdin(), shell, TokioPacer, flags);
    Ok(tokio::select! {
        played = interpreter.run(session) => match played {
            Ok(outcome) => Ended::Playback(outcome),
            Err(e) => Ended::Failed(e),
        },
        exited = relay_exit.wait() => match exited {
            Ok(()) => Ended::ChildExited,
            Err(e) => Ended::Failed(e),
        },
        _ = sigterm.recv() => Ended::Terminated,
    })
}

fn output_relay(config: &SessionConfig, pty: PtyPair) -> ! {
    let PtyPair { master, slave } = pty;
    let reader = master.try_clone_reader();
    let shutdown = Shutdown::new(Role::OutputRelay, master);

    let shell = match spawn_shell(slave.as_ref(), config) {
        Ok(shell) => shell,
        Err(e) => shutdown.fatal(&e),
    };
    drop(slave);
    let Some(shell_pid) = shell.process_id() else {
        shutdown.fatal(&anyhow!("Shell process has no pid"))
    };
    let shell_pid = Pid::from_raw(shell_pid as i32);

    // Keystrokes are read only by the input driver.
    if let Err(e) = nix::unistd::close(nix::libc::STDIN_FILENO) {
        debug!("failed to close stdin: {e}");
    }

    let reader = match reader {
        Ok(reader) => reader,
        Err(e) => shutdown.fatal(&e.context("Failed to open PTY reader")),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(e) => shutdown.fatal(&e),
    };
    info!(shell = %shell_pid, "output relay started");

    match runtime.block_on(relay_output(reader, shell_pid)) {
        Err(e) => shutdown.fatal(&e),
        Ok(ended) => {
            info!(role = ?shutdown.role(), ?ended, "ending session");
            shutdown.terminate()
        }
    }
}

async fn relay_output(reader: Box<dyn Read + Send>, shell: Pid) -> Result<Ended> {
    let mut shell_exit = ChildWatcher::new(shell)?;
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    shutdown::unblock_termination_signals()?;

    let copy = tokio::task::spawn_blocking(move || copy_output(reader, std::io::stdout()));
    Ok(tokio::select! {
        copied = copy => match copied {
            Ok(Ok(bytes)) => {
                debug!(bytes, "PTY closed");
                Ended::PtyClosed
            }
            Ok(Err(e)) => Ended::Failed(anyhow!(e).context("Failed to write shell output")),
            Err(e) => Ended::Failed(anyhow!(e)),
        },
        exited = shell_exit.wait() => match exited {
            Ok(()) => Ended::ChildExited,
            Err(e) => Ended::Failed(e),
        },
        _ = sigterm.recv() => Ended::Terminated,
    })
}

/// Start the shell on the PTY slave: the shell runner role.
///
/// The shell gets the slave as stdin, stdout, stderr and controlling
/// terminal, and runs interactively (`-i`) or with `-c COMMAND`. An exec
/// failure is reported back here as an error.
fn spawn_shell(
    slave: &(dyn SlavePty + Send),
    config: &SessionConfig,
) -> Result<Box<dyn Child + Send + Sync>> {
    let mut cmd = CommandBuilder::new(&config.shell);
    cmd.args(config.shell_args());
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }

    let child = slave
        .spawn_command(cmd)
        .with_context(|| format!("Failed to start shell: {}", config.shell.display()))?;
    debug!(role = ?Role::ShellRunner, pid = ?child.process_id(), "shell started");
    Ok(child)
}
