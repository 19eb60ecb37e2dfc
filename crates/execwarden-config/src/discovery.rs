use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use execwarden_utils::paths;

use crate::error::ConfigError;
use crate::model::{CliOverrides, Config, ConfigSource, DiagnosticsSection, RunnerSection};

/// Overrides `[runner] timeout_secs`.
pub const TIMEOUT_ENV: &str = "EXECWARDEN_TIMEOUT_SECS";

/// Overrides `[runner] capture_limit_bytes`.
pub const CAPTURE_LIMIT_ENV: &str = "EXECWARDEN_CAPTURE_LIMIT";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    runner: Option<RunnerSection>,
    diagnostics: Option<DiagnosticsSection>,
}

/// Raw values of the environment overrides.
///
/// Captured up front so discovery itself never touches process-global state.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub timeout_secs: Option<String>,
    pub capture_limit_bytes: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_process_env() -> Self {
        Self {
            timeout_secs: std::env::var(TIMEOUT_ENV).ok(),
            capture_limit_bytes: std::env::var(CAPTURE_LIMIT_ENV).ok(),
        }
    }
}

fn parse_env<T: FromStr>(var: &str, raw: &str, expected: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvironment {
            var: var.to_string(),
            value: raw.to_string(),
            expected: expected.to_string(),
        })
}

impl Config {
    /// Discover and load configuration with precedence:
    /// CLI > environment > config file > defaults
    ///
    /// The config file is `cli.config_path` when given, else
    /// `<EXECWARDEN_HOME>/config.toml` if it exists.
    pub fn discover(cli: &CliOverrides) -> Result<Self> {
        Self::discover_from(&paths::execwarden_home(), cli, &EnvOverrides::from_process_env())
    }

    /// Discover configuration for an explicit home directory and environment.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state.
    pub fn discover_from(home: &Utf8Path, cli: &CliOverrides, env: &EnvOverrides) -> Result<Self> {
        let mut source_attribution = BTreeMap::new();
        for key in [
            "timeout_secs",
            "capture_limit_bytes",
            "drain_timeout_ms",
            "diagnostics_enabled",
            "diagnostics_path",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let mut runner = RunnerSection::default();
        let mut diagnostics = DiagnosticsSection::default();

        let config_file = match &cli.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => {
                let candidate = paths::config_file_in(home);
                candidate.is_file().then_some(candidate)
            }
        };

        if let Some(path) = &config_file {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {path}"))?;
            let source = ConfigSource::ConfigFile(path.clone());
            debug!(path = %path, "Loaded config file");

            if let Some(file_runner) = file_config.runner {
                if file_runner.timeout_secs.is_some() {
                    runner.timeout_secs = file_runner.timeout_secs;
                    source_attribution.insert("timeout_secs".to_string(), source.clone());
                }
                if file_runner.capture_limit_bytes.is_some() {
                    runner.capture_limit_bytes = file_runner.capture_limit_bytes;
                    source_attribution.insert("capture_limit_bytes".to_string(), source.clone());
                }
                if file_runner.drain_timeout_ms.is_some() {
                    runner.drain_timeout_ms = file_runner.drain_timeout_ms;
                    source_attribution.insert("drain_timeout_ms".to_string(), source.clone());
                }
            }
            if let Some(file_diagnostics) = file_config.diagnostics {
                if file_diagnostics.enabled.is_some() {
                    diagnostics.enabled = file_diagnostics.enabled;
                    source_attribution.insert("diagnostics_enabled".to_string(), source.clone());
                }
                if file_diagnostics.path.is_some() {
                    diagnostics.path = file_diagnostics.path;
                    source_attribution.insert("diagnostics_path".to_string(), source.clone());
                }
            }
        }

        if let Some(raw) = &env.timeout_secs {
            runner.timeout_secs = Some(parse_env(TIMEOUT_ENV, raw, "whole seconds")?);
            source_attribution.insert(
                "timeout_secs".to_string(),
                ConfigSource::Environment(TIMEOUT_ENV.to_string()),
            );
        }
        if let Some(raw) = &env.capture_limit_bytes {
            runner.capture_limit_bytes = Some(parse_env(CAPTURE_LIMIT_ENV, raw, "a byte count")?);
            source_attribution.insert(
                "capture_limit_bytes".to_string(),
                ConfigSource::Environment(CAPTURE_LIMIT_ENV.to_string()),
            );
        }

        if cli.timeout_secs.is_some() {
            runner.timeout_secs = cli.timeout_secs;
            source_attribution.insert("timeout_secs".to_string(), ConfigSource::Cli);
        }
        if cli.capture_limit_bytes.is_some() {
            runner.capture_limit_bytes = cli.capture_limit_bytes;
            source_attribution.insert("capture_limit_bytes".to_string(), ConfigSource::Cli);
        }

        let config = Self {
            runner,
            diagnostics,
            config_file,
            source_attribution,
        };
        config.validate()?;
        for (key, source) in &config.source_attribution {
            debug!(key = %key, source = %source, "Effective configuration");
        }
        Ok(config)
    }

    fn load_config_file(path: &Utf8Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: TomlConfig =
            toml::from_str(&content).with_context(|| format!("Failed to parse TOML: {path}"))?;
        Ok(config)
    }

    /// Validate effective values
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.runner.drain_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "drain_timeout_ms".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_home() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    fn write_config(home: &Utf8Path, content: &str) -> Utf8PathBuf {
        let path = home.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let (_dir, home) = temp_home();
        let config =
            Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default())
                .unwrap();

        assert!(config.config_file.is_none());
        assert_eq!(config.timeout(), None);
        assert_eq!(config.capture_limit(), None);
        assert_eq!(config.drain_timeout(), Duration::from_millis(100));
        assert!(config.diagnostics_enabled());
        assert_eq!(config.source_of("timeout_secs"), Some(&ConfigSource::Default));
    }

    #[test]
    fn test_file_in_home_is_discovered() {
        let (_dir, home) = temp_home();
        let path = write_config(
            &home,
            "[runner]\ntimeout_secs = 30\ncapture_limit_bytes = 4096\ndrain_timeout_ms = 250\n\n\
             [diagnostics]\nenabled = false\n",
        );
        let config =
            Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default())
                .unwrap();

        assert_eq!(config.config_file.as_ref(), Some(&path));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.capture_limit(), Some(4096));
        assert_eq!(config.drain_timeout(), Duration::from_millis(250));
        assert!(!config.diagnostics_enabled());
        assert_eq!(
            config.source_of("drain_timeout_ms"),
            Some(&ConfigSource::ConfigFile(path))
        );
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let (_dir, home) = temp_home();
        write_config(&home, "[runner]\ntimeout_secs = 30\ncapture_limit_bytes = 4096\n");
        let env = EnvOverrides {
            timeout_secs: Some("60".to_string()),
            capture_limit_bytes: Some("8192".to_string()),
        };
        let cli = CliOverrides {
            timeout_secs: Some(90),
            ..CliOverrides::default()
        };
        let config = Config::discover_from(&home, &cli, &env).unwrap();

        assert_eq!(config.timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.source_of("timeout_secs"), Some(&ConfigSource::Cli));
        assert_eq!(config.capture_limit(), Some(8192));
        assert_eq!(
            config.source_of("capture_limit_bytes"),
            Some(&ConfigSource::Environment(CAPTURE_LIMIT_ENV.to_string()))
        );
    }

    #[test]
    fn test_explicit_config_path_wins_over_home() {
        let (_dir, home) = temp_home();
        write_config(&home, "[runner]\ntimeout_secs = 30\n");
        let (_other_dir, other) = temp_home();
        let explicit = other.join("custom.toml");
        std::fs::write(&explicit, "[runner]\ntimeout_secs = 5\n").unwrap();

        let cli = CliOverrides {
            config_path: Some(explicit.clone()),
            ..CliOverrides::default()
        };
        let config = Config::discover_from(&home, &cli, &EnvOverrides::default()).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.config_file, Some(explicit));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let (_dir, home) = temp_home();
        let cli = CliOverrides {
            config_path: Some(home.join("absent.toml")),
            ..CliOverrides::default()
        };
        let err = Config::discover_from(&home, &cli, &EnvOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config file"));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let (_dir, home) = temp_home();
        write_config(&home, "[runner\ntimeout_secs = ");
        let result =
            Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let (_dir, home) = temp_home();
        write_config(&home, "[runner]\ntimeout_secs = 0\n");
        let err = Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            })
        );
    }

    #[test]
    fn test_zero_drain_timeout_rejected() {
        let (_dir, home) = temp_home();
        write_config(&home, "[runner]\ndrain_timeout_ms = 0\n");
        let err = Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("drain_timeout_ms"));
    }

    #[test]
    fn test_zero_capture_limit_is_allowed() {
        let (_dir, home) = temp_home();
        let cli = CliOverrides {
            capture_limit_bytes: Some(0),
            ..CliOverrides::default()
        };
        let config = Config::discover_from(&home, &cli, &EnvOverrides::default()).unwrap();
        assert_eq!(config.capture_limit(), Some(0));
    }

    #[test]
    fn test_invalid_env_value_rejected() {
        let (_dir, home) = temp_home();
        let env = EnvOverrides {
            timeout_secs: Some("soon".to_string()),
            ..EnvOverrides::default()
        };
        let err = Config::discover_from(&home, &CliOverrides::default(), &env).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidEnvironment { var, .. }) if var == TIMEOUT_ENV
        ));
    }

    #[test]
    fn test_diagnostics_path_taken_as_given() {
        let (_dir, home) = temp_home();
        write_config(&home, "[diagnostics]\npath = \"records/last.json\"\n");
        let config =
            Config::discover_from(&home, &CliOverrides::default(), &EnvOverrides::default())
                .unwrap();
        assert_eq!(config.diagnostics_path(), Utf8PathBuf::from("records/last.json"));
        assert!(matches!(
            config.source_of("diagnostics_path"),
            Some(ConfigSource::ConfigFile(_))
        ));
    }
}
