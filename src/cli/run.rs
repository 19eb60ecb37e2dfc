//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Initializes logging
//! - Discovers Config
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;

use execwarden_config::{CliOverrides, Config};
use execwarden_utils::logging::init_tracing;

use super::args::{Cli, Commands};
use super::commands;
use crate::ExitCode;

/// Main CLI execution function.
///
/// Handles ALL output including errors. Returns `Err(ExitCode)` for any
/// non-zero exit; main.rs only maps that to `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                Err(ExitCode::CLI_ARGS)
            } else {
                Ok(())
            };
        }
    };

    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("execwarden: logging unavailable: {err}");
    }

    let overrides = match &cli.command {
        Commands::Run(args) => CliOverrides {
            config_path: cli.config.clone(),
            timeout_secs: args.timeout,
            capture_limit_bytes: args.capture_limit,
        },
        Commands::Diagnostics { .. } => CliOverrides {
            config_path: cli.config.clone(),
            ..CliOverrides::default()
        },
    };

    let config = match Config::discover(&overrides) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("execwarden: configuration error: {err:#}");
            return Err(ExitCode::CLI_ARGS);
        }
    };

    let outcome = match &cli.command {
        Commands::Run(args) => commands::execute_run(args, &config),
        Commands::Diagnostics { json } => commands::execute_diagnostics(&config, *json),
    };

    match outcome {
        Ok(ExitCode::SUCCESS) => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            eprintln!("execwarden: {err:#}");
            Err(ExitCode::INTERNAL)
        }
    }
}
