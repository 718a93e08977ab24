//! The operator's terminal and the PTY the shell runs on.

use anyhow::{Context as _, Result};
use nix::sys::termios::{self, SetArg, Termios};
use portable_pty::{MasterPty, PtyPair, PtySize};
use std::fs::File;
use std::os::fd::{AsFd, BorrowedFd};

/// Attributes and window size of the operator's terminal, captured once at
/// startup before anything is changed.
#[derive(Debug, Clone)]
pub struct TerminalState {
    original: Termios,
    size: PtySize,
}

impl TerminalState {
    /// Capture the attributes and window size of `fd`.
    ///
    /// A terminal that reports a zero-sized window gets the PTY default size.
    pub fn capture(fd: impl AsFd) -> Result<Self> {
        let fd = fd.as_fd();
        let original = termios::tcgetattr(fd).context("Standard input is not a terminal")?;
        let size = rustix::termios::tcgetwinsize(fd)
            .ok()
            .filter(|ws| ws.ws_row > 0 && ws.ws_col > 0)
            .map(|ws| PtySize {
                rows: ws.ws_row,
                cols: ws.ws_col,
                pixel_width: ws.ws_xpixel,
                pixel_height: ws.ws_ypixel,
            })
            .unwrap_or_default();
        Ok(Self { original, size })
    }

    pub fn size(&self) -> PtySize {
        self.size
    }

    /// The raw variant of the captured attributes: no line buffering, no
    /// signal characters, no local echo.
    pub fn raw_attributes(&self) -> Termios {
        let mut raw = self.original.clone();
        termios::cfmakeraw(&mut raw);
        raw
    }

    /// Switch `fd` to raw mode. The returned guard puts the captured
    /// attributes back.
    pub fn enter_raw_mode<Fd: AsFd>(&self, fd: Fd) -> Result<RawMode<Fd>> {
        termios::tcsetattr(fd.as_fd(), SetArg::TCSAFLUSH, &self.raw_attributes())
            .context("Failed to put the terminal in raw mode")?;
        Ok(RawMode {
            fd,
            original: Some(self.original.clone()),
        })
    }

    /// Open a PTY pair with the captured window size and attributes.
    ///
    /// # Errors
    ///
    /// Fails if the system has no free PTY.
    pub fn acquire_pty(&self) -> Result<PtyPair> {
        let pair = portable_pty::native_pty_system()
            .openpty(self.size)
            .context("Failed to open PTY")?;

        // Attributes set through the master apply to the slave side.
        if let Some(raw) = pair.master.as_raw_fd() {
            // SAFETY: the descriptor is owned by `pair.master`, which is alive
            // for the whole borrow.
            let master = unsafe { BorrowedFd::borrow_raw(raw) };
            termios::tcsetattr(master, SetArg::TCSANOW, &self.original)
                .context("Failed to copy terminal attributes to the PTY")?;
        }

        Ok(pair)
    }
}

/// Open an independent write handle on the PTY master.
///
/// Used instead of `MasterPty::take_writer`, whose writer sends a newline and
/// an end-of-file character to the shell when dropped. Dropping this handle
/// only closes the descriptor.
pub fn master_writer(master: &dyn MasterPty) -> Result<File> {
    let raw = master
        .as_raw_fd()
        .context("PTY master has no file descriptor")?;
    // SAFETY: the descriptor is owned by `master`, which outlives the borrow;
    // the clone is a new descriptor with its own lifetime.
    let fd = unsafe { BorrowedFd::borrow_raw(raw) };
    let owned = fd
        .try_clone_to_owned()
        .context("Failed to open PTY writer")?;
    Ok(File::from(owned))
}

/// A terminal in raw mode, holding the attributes to put back.
pub struct RawMode<Fd: AsFd> {
    fd: Fd,
    original: Option<Termios>,
}

impl<Fd: AsFd> RawMode<Fd> {
    /// Reapply the captured attributes.
    ///
    /// Only the first call touches the terminal; it returns `true`. Later
    /// calls return `false`.
    pub fn restore(&mut self) -> Result<bool> {
        let Some(original) = self.original.take() else {
            return Ok(false);
        };
        termios::tcsetattr(self.fd.as_fd(), SetArg::TCSAFLUSH, &original)
            .context("Failed to restore terminal attributes")?;
        Ok(true)
    }
}
