//! Command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

use execwarden_config::Config;
use execwarden_diagnostics::{
    DiagnosticsRecord, DiagnosticsRecorder, FileDiagnosticsStore, MemoryDiagnosticsStore,
};
use execwarden_runner::{CancellationToken, CommandResult, CommandSpec, ProcessExecutor};

use super::args::RunArgs;
use crate::ExitCode;

/// Build the invocation for `args`, taking timeout and capture limit from
/// the effective configuration (which already reflects the CLI flags).
///
/// Returns `None` when `args.command` is empty.
#[must_use]
pub fn build_spec(args: &RunArgs, config: &Config) -> Option<CommandSpec> {
    let (program, rest) = args.command.split_first()?;
    let mut spec = CommandSpec::new(program.clone()).args(rest.iter().cloned());
    if !args.env.is_empty() {
        spec = spec.envs(args.env.iter().cloned());
    }
    if let Some(cwd) = &args.cwd {
        spec = spec.cwd(cwd.clone());
    }
    if let Some(timeout) = config.timeout() {
        spec = spec.timeout(timeout);
    }
    if let Some(limit) = config.capture_limit() {
        spec = spec.capture_limit(limit);
    }
    Some(spec)
}

fn recorder_for(config: &Config) -> Arc<dyn DiagnosticsRecorder> {
    if config.diagnostics_enabled() {
        Arc::new(FileDiagnosticsStore::new(config.diagnostics_path()))
    } else {
        Arc::new(MemoryDiagnosticsStore::new())
    }
}

/// `execwarden run`
pub(crate) fn execute_run(args: &RunArgs, config: &Config) -> Result<ExitCode> {
    let Some(spec) = build_spec(args, config) else {
        anyhow::bail!("no command given");
    };
    let executor = ProcessExecutor::new(recorder_for(config))
        .with_drain_timeout(config.drain_timeout());

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let outcome = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    debug!("Interrupt received");
                    cancel.cancel();
                }
            })
        };
        let outcome = executor.execute_with_cancel(spec, cancel).await;
        interrupt.abort();
        outcome
    });

    match outcome {
        Ok(result) => {
            forward_output(&result)?;
            if result.was_cancelled {
                eprintln!("execwarden: command cancelled");
            }
            Ok(ExitCode::for_result(&result))
        }
        Err(err) => {
            if let Some(partial) = err.partial_result() {
                forward_output(partial)?;
            }
            eprintln!("execwarden: {err}");
            Ok(ExitCode::for_error(&err))
        }
    }
}

/// Write captured output to the matching streams of this process.
fn forward_output(result: &CommandResult) -> Result<()> {
    write_ignoring_broken_pipe(&mut std::io::stdout().lock(), &result.stdout)
        .context("Failed to write captured stdout")?;
    write_ignoring_broken_pipe(&mut std::io::stderr().lock(), &result.stderr)
        .context("Failed to write captured stderr")?;
    Ok(())
}

fn write_ignoring_broken_pipe(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    match out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Text printed by `execwarden diagnostics`.
pub fn render_diagnostics(record: Option<&DiagnosticsRecord>, json: bool) -> Result<String> {
    match (record, json) {
        (None, false) => Ok("No diagnostics recorded\n".to_string()),
        (None, true) => Ok("null\n".to_string()),
        (Some(record), false) => Ok(record.to_string()),
        (Some(record), true) => {
            let mut text = serde_json::to_string_pretty(record)
                .context("Failed to serialize diagnostics record")?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// `execwarden diagnostics`: read-only.
pub(crate) fn execute_diagnostics(config: &Config, json: bool) -> Result<ExitCode> {
    let store = FileDiagnosticsStore::new(config.diagnostics_path());
    let record = store.load_last();
    let text = render_diagnostics(record.as_ref(), json)?;
    write_ignoring_broken_pipe(&mut std::io::stdout().lock(), &text)
        .context("Failed to write diagnostics")?;
    Ok(ExitCode::SUCCESS)
}
