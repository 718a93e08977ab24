//! Startup configuration shared by every role.
//!
//! A [`SessionConfig`] is built once in `main` and handed by value to
//! [`crate::topology::launch`]. After the process topology is formed each role
//! owns a private copy, so nothing here is ever mutated.

use std::path::PathBuf;

/// Script played when no path is given on the command line.
pub const DEFAULT_SCRIPT: &str = "session.sh";

/// Shell used when `SHELL` is unset.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Behavior switches fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// Pause between every character sent to the shell (`-d`).
    pub char_delay: bool,
    /// Auto-pace lines instead of waiting for the operator (`-n`).
    pub non_interactive: bool,
    /// A command was given with `-e`, so the shell runs it with `-c`.
    pub explicit_command: bool,
}

/// Immutable configuration value passed into each role's entry point.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub script: PathBuf,
    pub shell: PathBuf,
    pub command: Option<String>,
    pub flags: RuntimeFlags,
}

impl SessionConfig {
    /// Build a configuration, resolving the shell from the `SHELL` environment
    /// variable.
    pub fn new(
        script: impl Into<PathBuf>,
        command: Option<String>,
        char_delay: bool,
        non_interactive: bool,
    ) -> Self {
        let shell = std::env::var_os("SHELL")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SHELL));
        Self::with_shell(script, shell, command, char_delay, non_interactive)
    }

    /// Build a configuration with an explicit shell path.
    pub fn with_shell(
        script: impl Into<PathBuf>,
        shell: impl Into<PathBuf>,
        command: Option<String>,
        char_delay: bool,
        non_interactive: bool,
    ) -> Self {
        let flags = RuntimeFlags {
            char_delay,
            non_interactive,
            explicit_command: command.is_some(),
        };
        Self {
            script: script.into(),
            shell: shell.into(),
            command,
            flags,
        }
    }

    /// Arguments passed to the shell after its program name.
    ///
    /// An interactive shell (`-i`) when no command was given, otherwise the
    /// shell's `-c` execution form.
    pub fn shell_args(&self) -> Vec<String> {
        match &self.command {
            Some(command) => vec!["-c".to_string(), command.clone()],
            None => vec!["-i".to_string()],
        }
    }
}
