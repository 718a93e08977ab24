//! Byte relays between the real terminal and the PTY.
//!
//! [`passthrough_until`] forwards the operator's keystrokes to the shell;
//! [`copy_output`] copies everything the shell prints back to the terminal.

use anyhow::{Context as _, Result};
use std::io::{self, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt};

/// ETX, sent by Ctrl-C in raw mode. Ends a bounded passthrough.
pub const PASSTHROUGH_END: u8 = 0x03;

/// Why a passthrough stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughEnd {
    /// The terminator byte was read. It was not forwarded.
    Terminator,
    /// The keyboard reached end of input.
    Eof,
}

/// Relay bytes from `keyboard` to `shell` one at a time until `terminator`
/// is read. With no terminator the relay runs until end of input.
///
/// The terminator is checked before forwarding, so it never reaches the
/// shell and nothing is sent after it.
pub async fn passthrough_until<K, W>(
    keyboard: &mut K,
    shell: &mut W,
    terminator: Option<u8>,
) -> Result<PassthroughEnd>
where
    K: AsyncRead + Unpin,
    W: Write,
{
    let mut byte = [0u8; 1];
    loop {
        let n = keyboard
            .read(&mut byte)
            .await
            .context("Failed to read keyboard input")?;
        if n == 0 {
            return Ok(PassthroughEnd::Eof);
        }
        if terminator == Some(byte[0]) {
            return Ok(PassthroughEnd::Terminator);
        }
        shell.write_all(&byte).context("Failed to write to PTY")?;
        shell.flush().context("Failed to write to PTY")?;
    }
}

/// Copy PTY output to `out` until the PTY reports EOF or an error.
///
/// Read errors end the copy (a PTY master returns `EIO` once the slave side
/// is gone); write errors are returned. Returns the number of bytes copied.
pub fn copy_output<R: Read, W: Write>(mut reader: R, mut out: W) -> io::Result<u64> {
    let mut buffer = [0u8; 4096];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.write_all(&buffer[..n])?;
                out.flush()?;
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    Ok(total)
}
