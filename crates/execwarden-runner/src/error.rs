//! Error types for the runner

use std::time::Duration;
use thiserror::Error;

use crate::result::CommandResult;

/// Ways an invocation can fail to produce an ordinary [`CommandResult`].
///
/// Non-zero exit codes and cancellation are *not* errors; they are reported
/// through the result.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The OS refused to start the process (missing executable, permission
    /// denied, bad working directory, ...).
    #[error("Failed to launch '{program}': {reason}")]
    LaunchFailure { program: String, reason: String },

    /// The timeout elapsed first. `partial` holds whatever was captured up
    /// to termination.
    #[error("Command timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        partial: Box<CommandResult>,
    },
}

impl RunnerError {
    #[must_use]
    pub const fn is_launch_failure(&self) -> bool {
        matches!(self, Self::LaunchFailure { .. })
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Output captured before a timeout, if this is one.
    #[must_use]
    pub fn partial_result(&self) -> Option<&CommandResult> {
        match self {
            Self::Timeout { partial, .. } => Some(partial),
            Self::LaunchFailure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::sample_result;

    #[test]
    fn test_launch_failure_message_names_program() {
        let err = RunnerError::LaunchFailure {
            program: "missing-tool".to_string(),
            reason: "No such file or directory (os error 2)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to launch 'missing-tool': No such file or directory (os error 2)"
        );
        assert!(err.is_launch_failure());
        assert!(err.partial_result().is_none());
    }

    #[test]
    fn test_timeout_carries_partial_output() {
        let partial = CommandResult {
            timed_out: true,
            ..sample_result()
        };
        let err = RunnerError::Timeout {
            timeout: Duration::from_secs(2),
            partial: Box::new(partial),
        };
        assert_eq!(err.to_string(), "Command timed out after 2s");
        assert!(err.is_timeout());
        assert_eq!(err.partial_result().unwrap().stdout, "hello\n");
    }
}
