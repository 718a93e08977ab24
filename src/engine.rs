use crate::config::RuntimeFlags;
use crate::directive::{Directive, Line, classify_line};
use crate::pacing::{AUTO_PACE_TENTHS, CHAR_DELAY_TENTHS, Pacer};
use crate::relay::{PASSTHROUGH_END, PassthroughEnd, passthrough_until};
use crate::session::Session;
use anyhow::{Context as _, Result};
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Longest operator reply read at a gate.
const REPLY_LIMIT: usize = 8192;

/// How playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every line was played.
    Completed,
    /// The operator typed `exit`/`x`, or the keyboard closed at a gate.
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Proceed,
    Exit,
}

/// Plays a [`Session`] into the shell as simulated typing.
///
/// `keyboard` is the operator's terminal, `shell` is the PTY master and
/// `pacer` supplies every pause.
pub struct Interpreter<K, W, P> {
    keyboard: K,
    shell: W,
    pacer: P,
    flags: RuntimeFlags,
}

impl<K, W, P> Interpreter<K, W, P>
where
    K: AsyncRead + Unpin,
    W: Write,
    P: Pacer,
{
    pub fn new(keyboard: K, shell: W, pacer: P, flags: RuntimeFlags) -> Self {
        Interpreter {
            keyboard,
            shell,
            pacer,
            flags,
        }
    }

    /// Play the whole session, then hand the keyboard to the shell until
    /// the operator's input ends.
    pub async fn run(&mut self, session: &Session) -> Result<Outcome> {
        if self.play(session).await? == Outcome::Exited {
            return Ok(Outcome::Exited);
        }

        info!("script finished, passing keyboard through to the shell");
        passthrough_until(&mut self.keyboard, &mut self.shell, None).await?;
        Ok(Outcome::Completed)
    }

    /// Play every line of the session in order.
    pub async fn play(&mut self, session: &Session) -> Result<Outcome> {
        for line in session.lines() {
            match classify_line(line) {
                Line::Directive(text) => self.execute(Directive::parse(text)).await?,
                Line::Plain(text) => {
                    if self.type_line(text).await? == Gate::Exit {
                        info!("operator ended the session");
                        return Ok(Outcome::Exited);
                    }
                }
            }
        }
        Ok(Outcome::Completed)
    }

    /// Execute a single directive.
    ///
    /// Directive delays always sleep, independent of the per-character
    /// delay flag.
    pub async fn execute(&mut self, directive: Directive) -> Result<()> {
        match directive {
            Directive::Passthrough => {
                debug!("passthrough directive");
                self.passthrough().await?;
            }
            Directive::Delay(count) => {
                debug!(tenths = count, "delay directive");
                self.pacer.pause(count).await;
            }
            Directive::Unknown(text) => {
                debug!(%text, "ignoring unknown directive");
            }
        }
        Ok(())
    }

    /// Send a line one character at a time, stopping at the gate before the
    /// first character and before every line break.
    async fn type_line(&mut self, line: &str) -> Result<Gate> {
        if self.gate().await? == Gate::Exit {
            return Ok(Gate::Exit);
        }

        let mut encoded = [0u8; 4];
        for ch in line.chars() {
            if matches!(ch, '\n' | '\r') && self.gate().await? == Gate::Exit {
                return Ok(Gate::Exit);
            }

            self.send(ch.encode_utf8(&mut encoded).as_bytes())?;

            if self.flags.char_delay {
                self.pacer.pause(CHAR_DELAY_TENTHS).await;
            }
        }
        Ok(Gate::Proceed)
    }

    /// Wait for the operator, or auto-pace in non-interactive mode.
    async fn gate(&mut self) -> Result<Gate> {
        if self.flags.non_interactive {
            self.pacer.pause(AUTO_PACE_TENTHS).await;
            return Ok(Gate::Proceed);
        }

        let Some(reply) = self.read_reply().await? else {
            info!("keyboard closed while waiting for the operator");
            return Ok(Gate::Exit);
        };

        match reply.as_str() {
            "exit" | "x" => Ok(Gate::Exit),
            "passthrough" | "pass" | "p" => {
                self.passthrough().await?;
                Ok(Gate::Proceed)
            }
            _ => Ok(Gate::Proceed),
        }
    }

    /// Read one reply line from the keyboard. Returns `None` when input ends
    /// before a line break.
    async fn read_reply(&mut self) -> Result<Option<String>> {
        let mut reply = Vec::new();
        let mut byte = [0u8; 1];
        while reply.len() < REPLY_LIMIT {
            let n = self
                .keyboard
                .read(&mut byte)
                .await
                .context("Failed to read keyboard input")?;
            if n == 0 {
                return Ok(None);
            }
            if matches!(byte[0], b'\n' | b'\r') {
                break;
            }
            reply.push(byte[0]);
        }
        Ok(Some(String::from_utf8_lossy(&reply).into_owned()))
    }

    async fn passthrough(&mut self) -> Result<PassthroughEnd> {
        let end =
            passthrough_until(&mut self.keyboard, &mut self.shell, Some(PASSTHROUGH_END)).await?;
        debug!(?end, "passthrough finished");
        Ok(end)
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.shell.write_all(data).context("Failed to write to PTY")?;
        self.shell.flush().context("Failed to write to PTY")?;
        Ok(())
    }

    /// The shell-side sink.
    pub fn shell(&self) -> &W {
        &self.shell
    }
}
