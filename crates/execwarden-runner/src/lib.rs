//! Asynchronous external-process execution with bounded output capture.
//!
//! A [`ProcessExecutor`] launches one child per invocation and drains stdout
//! and stderr concurrently into tail-retaining [`OutputBuffer`]s. Natural
//! exit, an optional timeout and a caller-supplied cancellation token race for
//! a single [`ResolutionGate`]; whichever claims it first decides the
//! outcome. Every invocation ends with exactly one of:
//!
//! - `Ok(CommandResult)`: the process ran (any exit code, or cancelled)
//! - `Err(RunnerError::LaunchFailure)`: the process never started
//! - `Err(RunnerError::Timeout)`: the process was killed at its deadline
//!
//! A diagnostics record is written for each of those outcomes.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style
//! invocation. Arguments are passed as discrete elements, never through a
//! shell.

mod assembler;
pub mod command_spec;
pub mod error;
pub mod executor;
pub mod gate;
mod launcher;
pub mod output_buffer;
mod platform;
mod reader;
pub mod result;
mod watchers;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use executor::{DEFAULT_DRAIN_TIMEOUT, ProcessExecutor};
pub use gate::{Claim, ExecutionState, ResolutionGate};
pub use output_buffer::OutputBuffer;
pub use result::{CommandResult, EXIT_CODE_UNKNOWN};
pub use tokio_util::sync::CancellationToken;
