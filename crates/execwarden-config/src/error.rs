use thiserror::Error;

/// Configuration values that were read successfully but are not usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Environment variable {var} has invalid value '{value}': expected {expected}")]
    InvalidEnvironment {
        var: String,
        value: String,
        expected: String,
    },
}
