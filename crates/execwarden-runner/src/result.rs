use std::time::Duration;

/// Exit code reported when the OS gave none (killed by a signal, or the wait
/// itself failed).
pub const EXIT_CODE_UNKNOWN: i32 = -1;

/// Outcome of one invocation that ran to a resolution.
///
/// Returned directly for natural completion and cancellation, and carried as
/// the partial result inside [`RunnerError::Timeout`](crate::RunnerError::Timeout).
/// At most one of `was_cancelled` / `timed_out` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub program: String,
    pub args: Vec<String>,
    /// Captured stdout, with a truncation notice when bytes were dropped
    pub stdout: String,
    /// Captured stderr, with a truncation notice when bytes were dropped
    pub stderr: String,
    /// Process exit code, or [`EXIT_CODE_UNKNOWN`]
    pub exit_code: i32,
    /// Terminating signal on Unix
    pub signal: Option<i32>,
    pub pid: Option<u32>,
    pub was_cancelled: bool,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub stdout_total_bytes: u64,
    pub stderr_total_bytes: u64,
    pub stdout_captured_bytes: usize,
    pub stderr_captured_bytes: usize,
    /// Wall-clock time from launch to resolution
    pub duration: Duration,
}

impl CommandResult {
    /// Exit code zero, and neither cancelled nor timed out.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.was_cancelled && !self.timed_out
    }

    #[must_use]
    pub const fn any_truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

#[cfg(test)]
pub(crate) fn sample_result() -> CommandResult {
    CommandResult {
        program: "echo".to_string(),
        args: vec!["hello".to_string()],
        stdout: "hello\n".to_string(),
        stderr: String::new(),
        exit_code: 0,
        signal: None,
        pid: Some(4242),
        was_cancelled: false,
        timed_out: false,
        stdout_truncated: false,
        stderr_truncated: false,
        stdout_total_bytes: 6,
        stderr_total_bytes: 0,
        stdout_captured_bytes: 6,
        stderr_captured_bytes: 0,
        duration: Duration::from_millis(3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_and_no_interruption() {
        let ok = sample_result();
        assert!(ok.is_success());

        let failed = CommandResult {
            exit_code: 2,
            ..sample_result()
        };
        assert!(!failed.is_success());

        let cancelled = CommandResult {
            was_cancelled: true,
            ..sample_result()
        };
        assert!(!cancelled.is_success());
    }

    #[test]
    fn test_any_truncated() {
        assert!(!sample_result().any_truncated());
        let truncated = CommandResult {
            stderr_truncated: true,
            ..sample_result()
        };
        assert!(truncated.any_truncated());
    }
}
