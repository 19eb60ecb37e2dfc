use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

// ============================================================================
// CommandSpec - one invocation's worth of input
// ============================================================================

/// Specification for a command to execute.
///
/// All process execution goes through this type to ensure argv-style
/// invocation: arguments are `Vec<OsString>` and are handed to the OS as
/// discrete elements, never concatenated into a shell string.
///
/// Besides the argv, a spec carries the invocation policy: environment
/// overrides (merged over the ambient environment, override wins), an
/// optional timeout, and an optional per-stream capture limit.
///
/// The executor takes a `CommandSpec` by value, so it cannot change while an
/// invocation is running.
///
/// # Example
///
/// ```rust
/// use execwarden_runner::CommandSpec;
/// use std::time::Duration;
///
/// let spec = CommandSpec::new("brew")
///     .args(["upgrade", "--greedy"])
///     .env("HOMEBREW_NO_COLOR", "1")
///     .timeout(Duration::from_secs(600))
///     .capture_limit(2 * 1024 * 1024);
///
/// assert_eq!(spec.args.len(), 2);
/// assert_eq!(spec.capture_limit, Some(2 * 1024 * 1024));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<OsString>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Optional environment overrides
    pub env: Option<HashMap<OsString, OsString>>,
    /// Forcefully terminate the process after this long
    pub timeout: Option<Duration>,
    /// Maximum bytes retained per output stream; unbounded when `None`
    pub capture_limit: Option<usize>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments, preserving order.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Override one environment variable.
    ///
    /// Overrides are applied on top of the inherited environment; a key
    /// that already exists there takes the override's value.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Override several environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let env_map = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in envs {
            env_map.insert(key.into(), value.into());
        }
        self
    }

    /// Terminate the process and report a timeout after `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retain at most `bytes` of the most recent output per stream.
    ///
    /// `0` retains nothing while still counting bytes and flagging
    /// truncation.
    #[must_use]
    pub fn capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = Some(bytes);
        self
    }

    /// Program name as UTF-8 (lossy), for logs and results.
    #[must_use]
    pub fn program_display(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Program and arguments rendered as one line for humans.
    ///
    /// Elements that contain whitespace, quotes, or are empty are wrapped in
    /// single quotes. The result is for display only and is never executed.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(quote_for_display)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Build a `tokio::process::Command` using argv-style APIs only.
    ///
    /// Stdio wiring is left to the launcher.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        if let Some(ref env) = self.env {
            cmd.envs(env);
        }

        cmd
    }
}

fn quote_for_display(part: &OsStr) -> String {
    let text = part.to_string_lossy();
    let needs_quotes = text.is_empty()
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\'));
    if needs_quotes {
        format!("'{}'", text.replace('\'', r"'\''"))
    } else {
        text.into_owned()
    }
}
