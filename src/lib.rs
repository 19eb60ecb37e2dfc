//! execwarden: external-process execution with bounded capture, timeouts,
//! cancellation and post-mortem diagnostics.
//!
//! The engine lives in [`execwarden_runner`]; this crate adds the
//! `execwarden` command-line front end and re-exports the stable API.
//!
//! ```rust,no_run
//! use execwarden::{CommandSpec, ProcessExecutor};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), execwarden::RunnerError> {
//! let executor = ProcessExecutor::with_default_store();
//! let result = executor
//!     .execute(
//!         CommandSpec::new("brew")
//!             .arg("outdated")
//!             .timeout(Duration::from_secs(120))
//!             .capture_limit(1024 * 1024),
//!     )
//!     .await?;
//! println!("exit {}: {}", result.exit_code, result.stdout);
//! # Ok(())
//! # }
//! ```

pub mod cli;
mod exit_codes;

pub use exit_codes::ExitCode;

pub use execwarden_config::{CliOverrides, Config, ConfigError, ConfigSource};
pub use execwarden_diagnostics::{
    DiagnosticsRecord, DiagnosticsRecorder, FileDiagnosticsStore, MemoryDiagnosticsStore,
    StreamStats,
};
pub use execwarden_runner::{
    CancellationToken, CommandResult, CommandSpec, EXIT_CODE_UNKNOWN, OutputBuffer,
    ProcessExecutor, RunnerError,
};
