//! Script loading.
//!
//! The whole script is read into memory before playback so the file handle is
//! released before any role is spawned.

use anyhow::{Context as _, Result};
use std::path::Path;

/// The ordered lines of a script, each with its original terminator.
///
/// Playback ends when the line iterator is exhausted; the end of the sequence
/// is the end-of-session marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    lines: Vec<String>,
}

impl Session {
    /// Read a script file into a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not valid UTF-8.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ttyrun::Session;
    ///
    /// let session = Session::load("session.sh").unwrap();
    /// println!("{} lines", session.len());
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script file: {}", path.display()))?;
        Ok(Self::from_text(&content))
    }

    /// Split script text into lines, keeping `\n` terminators in place.
    ///
    /// ```
    /// use ttyrun::Session;
    ///
    /// let session = Session::from_text("echo hi\n# delay 3\necho bye");
    /// let lines: Vec<&str> = session.lines().collect();
    /// assert_eq!(lines, ["echo hi\n", "# delay 3\n", "echo bye"]);
    /// ```
    pub fn from_text(content: &str) -> Self {
        Self {
            lines: content.split_inclusive('\n').map(str::to_owned).collect(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_terminators_preserved() {
        let session = Session::from_text("ls -l\r\n\npwd\n");
        let lines: Vec<&str> = session.lines().collect();
        assert_eq!(lines, ["ls -l\r\n", "\n", "pwd\n"]);
    }

    #[test]
    fn test_missing_final_newline() {
        let session = Session::from_text("one\ntwo");
        assert_eq!(session.len(), 2);
        assert_eq!(session.lines().last(), Some("two"));
    }

    #[test]
    fn test_empty_script() {
        let session = Session::from_text("");
        assert!(session.is_empty());
        assert_eq!(session.lines().count(), 0);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"echo hi\n# delay 3\necho bye\n").unwrap();

        let session = Session::load(file.path()).unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(session.lines().nth(1), Some("# delay 3\n"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Session::load("/nonexistent/ttyrun/session.sh")
            .unwrap_err()
            .to_string();
        assert!(err.contains("/nonexistent/ttyrun/session.sh"), "got: {err}");
    }
}
