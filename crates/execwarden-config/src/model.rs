use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default budget for the final drain of pipes still open after exit.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 100;

/// Where an effective configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in default (lowest precedence)
    Default,
    /// Loaded from the given config file
    ConfigFile(Utf8PathBuf),
    /// Read from the named environment variable
    Environment(String),
    /// Given on the command line (highest precedence)
    Cli,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::ConfigFile(path) => write!(f, "config ({path})"),
            Self::Environment(var) => write!(f, "env ({var})"),
            Self::Cli => write!(f, "cli"),
        }
    }
}

/// `[runner]` section of config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunnerSection {
    /// Default timeout applied when none is given on the command line
    pub timeout_secs: Option<u64>,
    /// Per-stream capture limit in bytes
    pub capture_limit_bytes: Option<usize>,
    pub drain_timeout_ms: Option<u64>,
}

/// `[diagnostics]` section of config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiagnosticsSection {
    /// Persist the last-invocation record to disk (default: true)
    pub enabled: Option<bool>,
    /// Override for the record location
    pub path: Option<Utf8PathBuf>,
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<Utf8PathBuf>,
    pub timeout_secs: Option<u64>,
    pub capture_limit_bytes: Option<usize>,
}

/// Effective configuration after discovery.
///
/// Built by [`Config::discover`] with precedence CLI > environment >
/// config file > built-in defaults. Each key's winning source is kept in
/// `source_attribution` and logged at debug level.
///
/// ```toml
/// [runner]
/// timeout_secs = 600
/// capture_limit_bytes = 2097152
/// drain_timeout_ms = 100
///
/// [diagnostics]
/// enabled = true
/// path = ".execwarden/diagnostics/last-invocation.json"
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub runner: RunnerSection,
    pub diagnostics: DiagnosticsSection,
    /// The config file that was loaded, if any
    pub config_file: Option<Utf8PathBuf>,
    pub source_attribution: BTreeMap<String, ConfigSource>,
}

impl Config {
    /// Timeout to apply to invocations, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.runner.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub const fn capture_limit(&self) -> Option<usize> {
        self.runner.capture_limit_bytes
    }

    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.runner.drain_timeout_ms.unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS))
    }

    #[must_use]
    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.enabled.unwrap_or(true)
    }

    /// Location of the last-invocation record.
    #[must_use]
    pub fn diagnostics_path(&self) -> Utf8PathBuf {
        self.diagnostics
            .path
            .clone()
            .unwrap_or_else(execwarden_utils::paths::last_invocation_path)
    }

    /// Source of the effective value for `key`.
    #[must_use]
    pub fn source_of(&self, key: &str) -> Option<&ConfigSource> {
        self.source_attribution.get(key)
    }
}
