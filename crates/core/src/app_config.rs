use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration trait implemented by every crate-level config struct
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    EnvVar(String),
    Default(String),
}

impl ConfigSource {
    /// Describe the source of `var`, falling back to the given default
    pub fn of(var: &str, default: impl Into<String>) -> Self {
        if env::var(var).is_ok() {
            ConfigSource::EnvVar(var.to_string())
        } else {
            ConfigSource::Default(default.into())
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Read an environment variable, or return the default when unset
pub fn env_or_default(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, mapping parse failures to
/// `ConfigError::InvalidValue` for `field`
pub fn parse_env<T: FromStr>(
    var: &str,
    default: &str,
    field: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    let raw = env_or_default(var, default);
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw,
        expected: expected.to_string(),
    })
}
