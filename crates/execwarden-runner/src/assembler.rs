use std::io;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use execwarden_diagnostics::{DiagnosticsRecord, StreamStats};

use crate::command_spec::CommandSpec;
use crate::error::RunnerError;
use crate::gate::ExecutionState;
use crate::output_buffer::{OutputBuffer, SharedBuffer, lock_buffer};
use crate::reader::{ReaderSet, drain_residual};
use crate::result::{CommandResult, EXIT_CODE_UNKNOWN};

/// Turns a resolved invocation into its [`CommandResult`].
///
/// Runs once, after the process has been reaped and the gate resolved.
pub(crate) struct ResultAssembler<'a> {
    pub spec: &'a CommandSpec,
    pub pid: Option<u32>,
    pub started: Instant,
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
    pub drain_timeout: Duration,
}

struct Captured {
    text: String,
    truncated: bool,
    total_bytes: u64,
    captured_bytes: usize,
}

impl Captured {
    fn from_buffer(buffer: &OutputBuffer) -> Self {
        Self {
            text: buffer.render(),
            truncated: buffer.is_truncated(),
            total_bytes: buffer.total_bytes(),
            captured_bytes: buffer.retained_len(),
        }
    }
}

impl ResultAssembler<'_> {
    pub(crate) async fn assemble<O, E>(
        self,
        readers: &mut ReaderSet<O, E>,
        disarm: &CancellationToken,
        status: io::Result<ExitStatus>,
        state: ExecutionState,
    ) -> CommandResult
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        disarm.cancel();
        if let Some(residual) = readers.stop().await {
            drain_residual(residual, &self.stdout, &self.stderr, self.drain_timeout).await;
        }

        let stdout = Captured::from_buffer(&lock_buffer(&self.stdout));
        let stderr = Captured::from_buffer(&lock_buffer(&self.stderr));
        let duration = self.started.elapsed();

        let (exit_code, signal) = match status {
            Ok(status) => (status.code().unwrap_or(EXIT_CODE_UNKNOWN), exit_signal(status)),
            Err(err) => {
                warn!(error = %err, "Failed to collect exit status");
                (EXIT_CODE_UNKNOWN, None)
            }
        };

        CommandResult {
            program: self.spec.program_display(),
            args: self
                .spec
                .args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            stdout: stdout.text,
            stderr: stderr.text,
            exit_code,
            signal,
            pid: self.pid,
            was_cancelled: state.cancelled,
            timed_out: state.timed_out,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            stdout_total_bytes: stdout.total_bytes,
            stderr_total_bytes: stderr.total_bytes,
            stdout_captured_bytes: stdout.captured_bytes,
            stderr_captured_bytes: stderr.captured_bytes,
            duration,
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Map an assembled result to the caller-facing outcome.
pub(crate) fn deliver(
    result: CommandResult,
    timeout: Option<Duration>,
) -> Result<CommandResult, RunnerError> {
    if result.timed_out {
        Err(RunnerError::Timeout {
            timeout: timeout.unwrap_or_default(),
            partial: Box::new(result),
        })
    } else {
        Ok(result)
    }
}

/// Diagnostics for an invocation whose process ran.
pub(crate) fn diagnostics_for(spec: &CommandSpec, result: &CommandResult) -> DiagnosticsRecord {
    DiagnosticsRecord {
        was_cancelled: result.was_cancelled,
        timed_out: result.timed_out,
        stdout: StreamStats {
            total_bytes: result.stdout_total_bytes,
            captured_bytes: result.stdout_captured_bytes as u64,
            truncated: result.stdout_truncated,
        },
        stderr: StreamStats {
            total_bytes: result.stderr_total_bytes,
            captured_bytes: result.stderr_captured_bytes as u64,
            truncated: result.stderr_truncated,
        },
        ..DiagnosticsRecord::completed(
            spec.command_line(),
            spec.capture_limit,
            result.exit_code,
            result.duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_buffer::shared_buffer;
    use crate::result::sample_result;

    #[test]
    fn test_deliver_timeout_wraps_partial() {
        let result = CommandResult {
            timed_out: true,
            ..sample_result()
        };
        let err = deliver(result, Some(Duration::from_secs(1))).unwrap_err();
        match err {
            RunnerError::Timeout { timeout, partial } => {
                assert_eq!(timeout, Duration::from_secs(1));
                assert!(partial.timed_out);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_deliver_cancelled_is_ok() {
        let result = CommandResult {
            was_cancelled: true,
            ..sample_result()
        };
        assert!(deliver(result, None).unwrap().was_cancelled);
    }

    #[test]
    fn test_diagnostics_copy_stream_stats() {
        let spec = CommandSpec::new("echo").arg("hello").capture_limit(4);
        let result = CommandResult {
            stdout_truncated: true,
            stdout_captured_bytes: 4,
            ..sample_result()
        };
        let record = diagnostics_for(&spec, &result);
        assert_eq!(record.command_line, "echo hello");
        assert_eq!(record.exit_code, Some(0));
        assert_eq!(record.capture_limit_bytes, Some(4));
        assert_eq!(record.stdout.total_bytes, 6);
        assert_eq!(record.stdout.captured_bytes, 4);
        assert!(record.stdout.truncated);
        assert!(record.launch_error.is_none());
    }

    #[tokio::test]
    async fn test_assemble_reports_flags_and_unknown_exit_on_wait_error() {
        let (_out_tx, out_rx) = tokio::io::duplex(16);
        let (_err_tx, err_rx) = tokio::io::duplex(16);
        let stdout = shared_buffer(Some(8));
        let stderr = shared_buffer(None);
        lock_buffer(&stdout).append_chunk(b"0123456789");
        let mut readers = ReaderSet::spawn(out_rx, err_rx, stdout.clone(), stderr.clone());

        let spec = CommandSpec::new("tool").arg("--go");
        let assembler = ResultAssembler {
            spec: &spec,
            pid: None,
            started: Instant::now(),
            stdout,
            stderr,
            drain_timeout: Duration::from_millis(10),
        };
        let state = ExecutionState {
            cancelled: true,
            timed_out: false,
            resolved: true,
        };
        let disarm = CancellationToken::new();
        let result = assembler
            .assemble(&mut readers, &disarm, Err(io::Error::other("wait failed")), state)
            .await;

        assert!(disarm.is_cancelled());
        assert!(readers.is_stopped());
        assert_eq!(result.exit_code, EXIT_CODE_UNKNOWN);
        assert!(result.was_cancelled);
        assert!(!result.timed_out);
        assert!(result.stdout_truncated);
        assert_eq!(result.stdout_total_bytes, 10);
        assert_eq!(result.stdout_captured_bytes, 8);
        assert!(result.stdout.ends_with("23456789"));
        assert_eq!(result.args, vec!["--go".to_string()]);
    }
}
