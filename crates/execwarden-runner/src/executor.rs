//! The invocation driver.
//!
//! [`ProcessExecutor::execute_with_cancel`] is the only place where the
//! pieces of an invocation meet: launch, stream readers, watchers, the
//! resolution gate, assembly and diagnostics.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use execwarden_diagnostics::{
    DiagnosticsRecord, DiagnosticsRecorder, FileDiagnosticsStore, MemoryDiagnosticsStore,
};
use execwarden_utils::logging::invocation_span;

use crate::assembler::{ResultAssembler, deliver, diagnostics_for};
use crate::command_spec::CommandSpec;
use crate::error::RunnerError;
use crate::gate::{Claim, ResolutionGate};
use crate::launcher::{launch, wait_for_exit};
use crate::platform::GroupKillGuard;
use crate::output_buffer::shared_buffer;
use crate::reader::ReaderSet;
use crate::result::CommandResult;
use crate::watchers::{CancellationListener, TerminationRequest, TimeoutWatcher};

/// How long the final drain may spend on pipes still open after exit.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Runs external processes and records diagnostics for each invocation.
///
/// An executor holds no per-invocation state, so it can be shared and used
/// for concurrent invocations. Concurrent invocations all write to the same
/// recorder and the last writer wins.
///
/// Dropping an `execute` future before it resolves kills the process and,
/// on Unix, its whole process group, stops its readers and watchers, and
/// records nothing.
#[derive(Clone)]
pub struct ProcessExecutor {
    recorder: Arc<dyn DiagnosticsRecorder>,
    drain_timeout: Duration,
}

impl std::fmt::Debug for ProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessExecutor")
            .field("drain_timeout", &self.drain_timeout)
            .finish_non_exhaustive()
    }
}

impl ProcessExecutor {
    #[must_use]
    pub fn new(recorder: Arc<dyn DiagnosticsRecorder>) -> Self {
        Self {
            recorder,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Executor that records to `<EXECWARDEN_HOME>/diagnostics/last-invocation.json`.
    #[must_use]
    pub fn with_default_store() -> Self {
        Self::new(Arc::new(FileDiagnosticsStore::at_default_location()))
    }

    /// Executor that keeps diagnostics in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDiagnosticsStore::new()))
    }

    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// The record written by the most recent invocation, if one is readable.
    #[must_use]
    pub fn last_diagnostics(&self) -> Option<DiagnosticsRecord> {
        self.recorder.load_last()
    }

    /// Run `spec` to completion or timeout.
    ///
    /// # Errors
    ///
    /// [`RunnerError::LaunchFailure`] if the process could not be started,
    /// [`RunnerError::Timeout`] if the timeout elapsed first.
    pub async fn execute(&self, spec: CommandSpec) -> Result<CommandResult, RunnerError> {
        self.execute_with_cancel(spec, CancellationToken::new()).await
    }

    /// Run `spec`, terminating it early if `cancel` fires.
    ///
    /// Cancellation is a normal outcome: the result comes back as `Ok` with
    /// `was_cancelled` set and whatever output was captured before the kill.
    /// A token that is already cancelled still launches the process and then
    /// kills it straight away.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_with_cancel(
        &self,
        spec: CommandSpec,
        cancel: CancellationToken,
    ) -> Result<CommandResult, RunnerError> {
        let span = invocation_span(&spec.program_display());
        self.run(spec, cancel).instrument(span).await
    }

    async fn run(
        &self,
        spec: CommandSpec,
        cancel: CancellationToken,
    ) -> Result<CommandResult, RunnerError> {
        let started = Instant::now();
        debug!(command = %spec.command_line(), "Launching process");

        let launched = match launch(&spec) {
            Ok(launched) => launched,
            Err(err) => {
                let reason = err.to_string();
                warn!(error = %reason, "Process failed to launch");
                self.persist(&DiagnosticsRecord::launch_failure(
                    spec.command_line(),
                    spec.capture_limit,
                    reason.clone(),
                    started.elapsed(),
                ));
                return Err(RunnerError::LaunchFailure {
                    program: spec.program_display(),
                    reason,
                });
            }
        };
        let mut child = launched.child;
        let pid = child.id();
        // Declared after `child` so it drops first, while the pid is still ours.
        let mut group_guard = GroupKillGuard::new(pid);

        let stdout = shared_buffer(spec.capture_limit);
        let stderr = shared_buffer(spec.capture_limit);
        let mut readers = ReaderSet::spawn(
            launched.stdout,
            launched.stderr,
            Arc::clone(&stdout),
            Arc::clone(&stderr),
        );

        let gate = Arc::new(ResolutionGate::new());
        let termination = TerminationRequest::new();
        let disarm = CancellationToken::new();
        let _timeout_watcher = TimeoutWatcher::spawn(
            spec.timeout,
            Arc::clone(&gate),
            Arc::clone(&termination),
            disarm.clone(),
        );
        let _cancel_listener = CancellationListener::spawn(
            cancel,
            Arc::clone(&gate),
            Arc::clone(&termination),
            disarm.clone(),
        );

        let status = wait_for_exit(&mut child, &termination).await;
        group_guard.disarm();
        if gate.try_claim(Claim::Completed) {
            debug!("Process exited on its own");
        }
        let state = gate.snapshot();

        let result = ResultAssembler {
            spec: &spec,
            pid,
            started,
            stdout,
            stderr,
            drain_timeout: self.drain_timeout,
        }
        .assemble(&mut readers, &disarm, status, state)
        .await;

        self.persist(&diagnostics_for(&spec, &result));
        debug!(
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            cancelled = result.was_cancelled,
            stdout_bytes = result.stdout_total_bytes,
            stderr_bytes = result.stderr_total_bytes,
            truncated = result.any_truncated(),
            duration_ms = result.duration.as_millis(),
            "Process finished"
        );

        deliver(result, spec.timeout)
    }

    fn persist(&self, record: &DiagnosticsRecord) {
        if let Err(err) = self.recorder.record(record) {
            warn!(error = %err, "Failed to write diagnostics record");
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::with_default_store()
    }
}
