//! Command-line interface for execwarden
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions (clap)
//! - `run`: Main entry point and command dispatch
//! - `commands`: Command implementations

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands, RunArgs};
pub use commands::{build_spec, render_diagnostics};
pub use run::run;
