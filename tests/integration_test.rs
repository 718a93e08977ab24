use async_trait::async_trait;
use nix::pty::{OpenptyResult, openpty};
use nix::sys::termios::{self, SetArg, Termios};
use portable_pty::CommandBuilder;
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::BorrowedFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, ExitStatus, Stdio};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};
use ttyrun::terminal::{TerminalState, master_writer};
use ttyrun::{Interpreter, Line, Outcome, Pacer, RuntimeFlags, Session, classify_line};

/// One observable action of the interpreter, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Sent(Vec<u8>),
    Paused(u64),
}

type Transcript = Rc<RefCell<Vec<Step>>>;

/// PTY master stand-in; consecutive writes are merged into one step.
struct Pty(Transcript);

impl Write for Pty {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut steps = self.0.borrow_mut();
        match steps.last_mut() {
            Some(Step::Sent(bytes)) => bytes.extend_from_slice(buf),
            _ => steps.push(Step::Sent(buf.to_vec())),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Clock(Transcript);

#[async_trait(?Send)]
impl Pacer for Clock {
    async fn pause(&mut self, count: u64) {
        self.0.borrow_mut().push(Step::Paused(count));
    }
}

async fn replay(script: &str, keys: &'static [u8], flags: RuntimeFlags) -> (Outcome, Vec<Step>) {
    let transcript = Transcript::default();
    let mut interpreter = Interpreter::new(
        keys,
        Pty(transcript.clone()),
        Clock(transcript.clone()),
        flags,
    );
    let outcome = interpreter
        .run(&Session::from_text(script))
        .await
        .unwrap();
    let steps = transcript.borrow().clone();
    (outcome, steps)
}

fn auto_paced() -> RuntimeFlags {
    RuntimeFlags {
        non_interactive: true,
        ..RuntimeFlags::default()
    }
}

fn sent(steps: &[Step]) -> Vec<u8> {
    steps
        .iter()
        .filter_map(|step| match step {
            Step::Sent(bytes) => Some(bytes.as_slice()),
            Step::Paused(_) => None,
        })
        .flatten()
        .copied()
        .collect()
}

#[tokio::test]
async fn test_non_interactive_playback_order() {
    let (outcome, steps) = replay("echo hi\n# delay 3\necho bye\n", b"", auto_paced()).await;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(
        steps,
        vec![
            Step::Paused(5),
            Step::Sent(b"echo hi".to_vec()),
            Step::Paused(5),
            Step::Sent(b"\n".to_vec()),
            Step::Paused(3),
            Step::Paused(5),
            Step::Sent(b"echo bye".to_vec()),
            Step::Paused(5),
            Step::Sent(b"\n".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_sent_bytes_equal_plain_lines() {
    let scripts = [
        "ls\npwd\n",
        "# delay 1\ncat <<EOF\nline one\r\nEOF\n",
        "echo first\n#passthrough\n  # note\necho last",
        "\n\n",
        "",
    ];

    for script in scripts {
        let (_, steps) = replay(script, b"", auto_paced()).await;

        let expected: String = Session::from_text(script)
            .lines()
            .filter(|line| matches!(classify_line(line), Line::Plain(_)))
            .collect();
        assert_eq!(sent(&steps), expected.as_bytes(), "script: {script:?}");
    }
}

#[tokio::test]
async fn test_trailing_passthrough_after_script() {
    // Two Returns play the line; everything after reaches the shell verbatim,
    // Ctrl-C included.
    let (outcome, steps) = replay("ls\n", b"\r\rexit\r\x03", RuntimeFlags::default()).await;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(sent(&steps), b"ls\nexit\r\x03");
}

#[tokio::test]
async fn test_passthrough_directive_drops_terminator() {
    let (_, steps) = replay("# passthrough\nls\n", b"vim\r\x03", auto_paced()).await;

    assert_eq!(sent(&steps), b"vim\rls\n");
}

#[tokio::test]
async fn test_char_delay_between_characters() {
    let flags = RuntimeFlags {
        char_delay: true,
        non_interactive: true,
        explicit_command: false,
    };
    let (_, steps) = replay("hi\n", b"", flags).await;

    assert_eq!(
        steps,
        vec![
            Step::Paused(5),
            Step::Sent(b"h".to_vec()),
            Step::Paused(2),
            Step::Sent(b"i".to_vec()),
            Step::Paused(2),
            Step::Paused(5),
            Step::Sent(b"\n".to_vec()),
            Step::Paused(2),
        ]
    );
}

#[tokio::test]
async fn test_operator_exit_stops_playback() {
    let (outcome, steps) = replay("one\ntwo\n", b"\r\rx\r", RuntimeFlags::default()).await;

    assert_eq!(outcome, Outcome::Exited);
    assert_eq!(sent(&steps), b"one\n");
}

#[tokio::test]
async fn test_exit_leaves_half_typed_line_unsent() {
    let terminal = openpty(None, None).unwrap();
    let state = TerminalState::capture(&terminal.slave).unwrap();
    let pair = state.acquire_pty().unwrap();

    // Raw slave: `cat` gets every byte unchanged and nothing is echoed.
    // SAFETY: `pair.master` owns the descriptor and outlives this borrow.
    let master = unsafe { BorrowedFd::borrow_raw(pair.master.as_raw_fd().unwrap()) };
    termios::tcsetattr(master, SetArg::TCSANOW, &state.raw_attributes()).unwrap();
    let _cat = pair.slave.spawn_command(CommandBuilder::new("cat")).unwrap();
    let mut shell_output = pair.master.try_clone_reader().unwrap();

    let writer = master_writer(pair.master.as_ref()).unwrap();
    let mut interpreter = Interpreter::new(
        &b"\rx\r"[..],
        writer,
        Clock(Transcript::default()),
        RuntimeFlags::default(),
    );
    let outcome = interpreter
        .run(&Session::from_text("rm -rf build\n"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Exited);
    drop(interpreter);

    // Anything the writer sent on drop would show up before the marker.
    master_writer(pair.master.as_ref())
        .unwrap()
        .write_all(b"!")
        .unwrap();
    let mut seen = Vec::new();
    let mut buf = [0u8; 256];
    while !seen.contains(&b'!') {
        let n = shell_output.read(&mut buf).unwrap();
        assert!(n > 0, "PTY closed early");
        seen.extend_from_slice(&buf[..n]);
    }
    assert_eq!(seen, b"rm -rf build!");
}

fn ttyrun() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ttyrun"));
    cmd.stdin(Stdio::null());
    cmd
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let output = ttyrun().arg("-z").output().expect("Failed to run ttyrun");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ttyrun [-e command] [-d] [-n] [file]"), "got: {stderr}");
}

#[test]
fn test_help_exits_with_one() {
    for flag in ["-h", "-?"] {
        let output = ttyrun().arg(flag).output().expect("Failed to run ttyrun");

        assert_eq!(output.status.code(), Some(1), "flag: {flag}");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("# delay DELAY"), "got: {stdout}");
    }
}

#[test]
fn test_missing_script() {
    let dir = tempfile::tempdir().unwrap();
    let output = ttyrun()
        .current_dir(dir.path())
        .output()
        .expect("Failed to run ttyrun");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("ttyrun: "), "got: {stderr}");
    assert!(stderr.contains("session.sh"), "got: {stderr}");
}

#[test]
fn test_stdin_must_be_a_terminal() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    script.write_all(b"echo hi\n").unwrap();

    let output = ttyrun()
        .args(["-n"])
        .arg(script.path())
        .output()
        .expect("Failed to run ttyrun");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a terminal"), "got: {stderr}");
}

/// A finished run of the binary on its own terminal.
struct Finished {
    status: ExitStatus,
    output: String,
    before: Termios,
    after: Termios,
}

/// Run ttyrun with stdin, stdout and stderr on a fresh terminal, collecting
/// everything it prints.
fn run_on_terminal(args: &[&str], script: &str) -> Finished {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(script.as_bytes()).unwrap();

    let OpenptyResult { master, slave } = openpty(None, None).unwrap();
    let before = termios::tcgetattr(&slave).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_ttyrun"))
        .args(args)
        .arg(file.path())
        .env("SHELL", "/bin/sh")
        .stdin(Stdio::from(slave.try_clone().unwrap()))
        .stdout(Stdio::from(slave.try_clone().unwrap()))
        .stderr(Stdio::from(slave.try_clone().unwrap()))
        .process_group(0)
        .spawn()
        .expect("Failed to run ttyrun");

    let mut master = File::from(master);
    let reader = thread::spawn(move || {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match master.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    });

    let deadline = Instant::now() + Duration::from_secs(20);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("ttyrun did not finish");
        }
        thread::sleep(Duration::from_millis(50));
    };

    let after = termios::tcgetattr(&slave).unwrap();
    // Last handle on the slave: the reader sees EIO and stops.
    drop(slave);
    let output = String::from_utf8_lossy(&reader.join().unwrap()).into_owned();
    Finished {
        status,
        output,
        before,
        after,
    }
}

fn assert_restored(run: &Finished) {
    assert_eq!(run.after.input_flags, run.before.input_flags);
    assert_eq!(run.after.output_flags, run.before.output_flags);
    assert_eq!(run.after.control_flags, run.before.control_flags);
    assert_eq!(run.after.local_flags, run.before.local_flags);
    assert_eq!(run.after.control_chars, run.before.control_chars);
}

#[test]
fn test_session_plays_script_into_shell() {
    let run = run_on_terminal(&["-n"], "echo ttyrun-$((6 * 7))\nexit\n");

    assert_eq!(run.status.code(), Some(0), "output: {}", run.output);
    assert!(run.output.contains("ttyrun-42"), "got: {}", run.output);
    assert_restored(&run);
}

#[test]
fn test_shell_exit_ends_session() {
    // Without -n the input driver is still waiting for the operator.
    let run = run_on_terminal(&["-e", "exit 0"], "sleep 100\n");

    assert_eq!(run.status.code(), Some(0), "output: {}", run.output);
    assert!(!run.output.contains("sleep 100"), "got: {}", run.output);
    assert_restored(&run);
}
