//! # ttyrun
//!
//! Play a shell script into an interactive shell, one typed line at a time.
//!
//! ttyrun reads a text file and sends each line to a shell running on a
//! pseudo-terminal as if it were being typed. By default a line is typed only
//! after the operator presses Return, and submitted after the next Return,
//! which makes it useful for live demonstrations and tutorials.
//!
//! ## Quick start
//!
//! ```no_run
//! use ttyrun::{SessionConfig, launch};
//!
//! fn main() {
//!     let config = SessionConfig::new("demo.sh", None, true, false);
//!     // Only returns if the session could not be set up.
//!     let Err(e) = launch(config);
//!     eprintln!("ttyrun: {e:#}");
//! }
//! ```
//!
//! ## Script syntax
//!
//! Every line is typed into the shell verbatim, line break included, except
//! comment lines, which carry control directives:
//!
//! | Line | Effect |
//! |------|--------|
//! | `ls -l` | Typed into the shell |
//! | `# passthrough` | Relay the operator's keys to the shell until Ctrl-C |
//! | `# delay 12` | Pause for 12 tenths of a second (default 5) |
//! | `# anything else` | Ignored |
//!
//! Any line containing a `#` is treated as a directive line, so it is never
//! typed.
//!
//! ## Operator replies
//!
//! While waiting, the operator can type a reply followed by Return:
//!
//! | Reply | Effect |
//! |-------|--------|
//! | *(empty)* | Continue |
//! | `x`, `exit` | End the session |
//! | `p`, `pass`, `passthrough` | Relay keys to the shell until Ctrl-C, then continue |
//!
//! With `-n` the operator is never asked; each pause lasts half a second.
//! After the last line the keyboard is connected straight to the shell until
//! the shell exits.
//!
//! ## Processes
//!
//! A session runs as three processes: the input driver (plays the script), the
//! output relay (copies shell output to the terminal) and the shell itself.
//! See [`topology`] for how they are wired and [`shutdown`] for how they end.

pub mod config;
pub mod directive;
pub mod engine;
pub mod pacing;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod terminal;
pub mod topology;

pub use config::{RuntimeFlags, SessionConfig};
pub use directive::{Directive, Line, classify_line};
pub use engine::{Interpreter, Outcome};
pub use pacing::{Pacer, TokioPacer};
pub use session::Session;
pub use shutdown::Role;
pub use topology::launch;
