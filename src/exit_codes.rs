//! Exit code constants for the `execwarden` binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Command ran and exited 0 |
//! | 1 | `INTERNAL` | General failure, or the child reported no exit code |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 124 | `TIMEOUT` | The command was killed at its timeout |
//! | 127 | `LAUNCH_FAILURE` | The command could not be started |
//! | 130 | `CANCELLED` | The command was cancelled (Ctrl-C) |
//!
//! Any other value is the child's own exit code, passed through.

use execwarden_runner::{CommandResult, EXIT_CODE_UNKNOWN, RunnerError};

/// Process exit code for the `execwarden` binary.
///
/// ```rust
/// use execwarden::ExitCode;
///
/// assert_eq!(ExitCode::TIMEOUT.as_i32(), 124);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::from(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// General failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid or missing command-line arguments, or unusable configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Command exceeded its timeout and was killed
    pub const TIMEOUT: ExitCode = ExitCode(124);

    /// Command could not be started
    pub const LAUNCH_FAILURE: ExitCode = ExitCode(127);

    /// Command was cancelled by the operator
    pub const CANCELLED: ExitCode = ExitCode(130);

    /// Numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Exit code reporting a finished invocation.
    ///
    /// Cancellation maps to [`CANCELLED`](Self::CANCELLED) even though the
    /// engine reports it as a successful result.
    #[must_use]
    pub const fn for_result(result: &CommandResult) -> Self {
        if result.was_cancelled {
            Self::CANCELLED
        } else if result.timed_out {
            Self::TIMEOUT
        } else if result.exit_code == EXIT_CODE_UNKNOWN {
            Self::INTERNAL
        } else {
            ExitCode(result.exit_code)
        }
    }

    #[must_use]
    pub const fn for_error(err: &RunnerError) -> Self {
        match err {
            RunnerError::LaunchFailure { .. } => Self::LAUNCH_FAILURE,
            RunnerError::Timeout { .. } => Self::TIMEOUT,
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(exit_code: i32) -> CommandResult {
        CommandResult {
            program: "tool".to_string(),
            args: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code,
            signal: None,
            pid: None,
            was_cancelled: false,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
            stdout_total_bytes: 0,
            stderr_total_bytes: 0,
            stdout_captured_bytes: 0,
            stderr_captured_bytes: 0,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_child_exit_code_passes_through() {
        assert_eq!(ExitCode::for_result(&result(0)), ExitCode::SUCCESS);
        assert_eq!(ExitCode::for_result(&result(3)).as_i32(), 3);
    }

    #[test]
    fn test_unknown_exit_code_maps_to_internal() {
        assert_eq!(ExitCode::for_result(&result(EXIT_CODE_UNKNOWN)), ExitCode::INTERNAL);
    }

    #[test]
    fn test_cancelled_result_maps_to_cancelled() {
        let cancelled = CommandResult {
            was_cancelled: true,
            ..result(EXIT_CODE_UNKNOWN)
        };
        assert_eq!(ExitCode::for_result(&cancelled), ExitCode::CANCELLED);
    }

    #[test]
    fn test_errors_map_to_distinct_codes() {
        let launch = RunnerError::LaunchFailure {
            program: "tool".to_string(),
            reason: "not found".to_string(),
        };
        let timeout = RunnerError::Timeout {
            timeout: Duration::from_secs(1),
            partial: Box::new(result(EXIT_CODE_UNKNOWN)),
        };
        assert_eq!(ExitCode::for_error(&launch), ExitCode::LAUNCH_FAILURE);
        assert_eq!(ExitCode::for_error(&timeout), ExitCode::TIMEOUT);
        assert_ne!(ExitCode::LAUNCH_FAILURE, ExitCode::TIMEOUT);
    }

    #[test]
    fn test_i32_conversions() {
        assert_eq!(i32::from(ExitCode::CANCELLED), 130);
        assert_eq!(ExitCode::from(127), ExitCode::LAUNCH_FAILURE);
    }
}
