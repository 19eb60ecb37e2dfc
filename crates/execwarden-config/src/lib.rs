//! Configuration management for execwarden
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > config file > defaults. The config file is TOML with
//! optional `[runner]` and `[diagnostics]` sections.

mod discovery;
mod error;
mod model;

pub use discovery::{CAPTURE_LIMIT_ENV, EnvOverrides, TIMEOUT_ENV};
pub use error::ConfigError;
pub use model::{
    CliOverrides, Config, ConfigSource, DEFAULT_DRAIN_TIMEOUT_MS, DiagnosticsSection,
    RunnerSection,
};
