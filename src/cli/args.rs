use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// execwarden - run external commands with bounded capture, timeouts and
/// cancellation
#[derive(Parser, Debug)]
#[command(name = "execwarden")]
#[command(about = "Run external commands with bounded output capture, timeouts and cancellation")]
#[command(long_about = r#"
execwarden runs one external command, captures the tail of its stdout and
stderr, enforces an optional timeout, and records a diagnostics snapshot of
every invocation.

EXAMPLES:
  # Run with a 10 minute timeout, keeping the last 2 MiB of each stream
  execwarden run --timeout 600 --capture-limit 2097152 -- brew upgrade

  # Override an environment variable for the child
  execwarden run --env HOMEBREW_NO_COLOR=1 -- brew outdated

  # Show what happened during the last invocation
  execwarden diagnostics --json

CONFIGURATION:
  Precedence: CLI flags > environment > config file > defaults
  The config file is <EXECWARDEN_HOME>/config.toml (EXECWARDEN_HOME defaults
  to .execwarden); use --config to point at another file.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command and report its outcome through the exit code
    ///
    /// Exit codes: the child's own code on completion (1 if it reported
    /// none), 124 on timeout, 127 if the command could not be started,
    /// 130 when cancelled with Ctrl-C.
    Run(RunArgs),

    /// Show the diagnostics record of the most recent invocation
    Diagnostics {
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Kill the command after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Keep at most this many of the most recent bytes per stream
    #[arg(long, value_name = "BYTES")]
    pub capture_limit: Option<usize>,

    /// Environment override for the child (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Working directory for the child
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Program followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

/// Parse `KEY=VALUE`; the value may itself contain `=`.
pub(crate) fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
