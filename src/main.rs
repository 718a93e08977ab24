use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use ttyrun::config::DEFAULT_SCRIPT;
use ttyrun::{SessionConfig, launch};

const CONTROL_HELP: &str = "\
Control commands:
  Commands can be given in the session file, or typed by the operator. In the
  session file they are written as comment lines.
    # passthrough   pass operator input directly to the shell until Ctrl-C
    # delay DELAY   pause for DELAY tenths of a second (default 5)
  While waiting for the operator:
    Return          send the line to the shell
    x               exit
    p               pass operator input through until Ctrl-C";

#[derive(Parser, Debug)]
#[command(
    name = "ttyrun",
    about = "Read a text file and run each line as if it were typed into a shell",
    long_about = "Read a text file and run each line as if it were typed into a shell.\n\
                  By default lines are loaded but not run until the operator presses\n\
                  Return, which is useful for demonstrations and tutorials.",
    override_usage = "ttyrun [-e command] [-d] [-n] [file]",
    after_long_help = CONTROL_HELP,
    disable_help_flag = true
)]
struct Args {
    /// Run COMMAND with the shell instead of an interactive shell
    #[arg(short = 'e', value_name = "COMMAND")]
    command: Option<String>,

    /// Add delays when sending characters to the shell, simulating typing
    #[arg(short = 'd')]
    delay: bool,

    /// Non-interactive mode: don't wait for the operator, just run the script
    #[arg(short = 'n')]
    non_interactive: bool,

    /// Print help
    #[arg(short = 'h', short_alias = '?')]
    help: bool,

    /// Session file to play
    #[arg(default_value = DEFAULT_SCRIPT)]
    file: PathBuf,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    if args.help {
        let _ = Args::command().print_long_help();
        std::process::exit(1);
    }

    init_tracing();

    let config = SessionConfig::new(args.file, args.command, args.delay, args.non_interactive);
    let Err(e) = launch(config);
    eprintln!("ttyrun: {e:#}");
    std::process::exit(1);
}

/// Log to stderr, filtered by `TTYRUN_LOG` (default `warn`).
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_env("TTYRUN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    drop(
        fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    );
}
