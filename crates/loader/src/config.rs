//! Batch window configuration

use std::collections::HashMap;
use std::time::Duration;

use tally_core::{parse_env, AppConfigTrait, ConfigError, ConfigSource};

/// How long a batch window stays open and how large it may grow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Time between the first load of a window and its dispatch
    pub wait: Duration,
    /// Distinct keys that close a window early; 0 means unlimited
    pub max_batch: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(2),
            max_batch: 100,
        }
    }
}

impl LoaderConfig {
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Whether a window holding `queued` distinct keys must dispatch now
    pub(crate) fn is_full(&self, queued: usize) -> bool {
        self.max_batch > 0 && queued >= self.max_batch
    }
}

impl AppConfigTrait for LoaderConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let wait_ms: u64 = parse_env("LOADER_WAIT_MS", "2", "wait", "milliseconds")?;
        let config = Self {
            wait: Duration::from_millis(wait_ms),
            max_batch: parse_env(
                "LOADER_MAX_BATCH",
                "100",
                "max_batch",
                "non-negative integer (0 = unlimited)",
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.wait.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "wait".to_string(),
                value: "0".to_string(),
                expected: "at least 1 millisecond".to_string(),
            });
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("wait".to_string(), ConfigSource::of("LOADER_WAIT_MS", "2"));
        sources.insert(
            "max_batch".to_string(),
            ConfigSource::of("LOADER_MAX_BATCH", "100"),
        );
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_defaults_from_env() {
        env::remove_var("LOADER_WAIT_MS");
        env::remove_var("LOADER_MAX_BATCH");
        let config = LoaderConfig::from_env().unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(
            config.config_sources().get("wait"),
            Some(&ConfigSource::Default("2".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        env::set_var("LOADER_WAIT_MS", "15");
        env::set_var("LOADER_MAX_BATCH", "0");
        let config = LoaderConfig::from_env();
        env::remove_var("LOADER_WAIT_MS");
        env::remove_var("LOADER_MAX_BATCH");

        let config = config.unwrap();
        assert_eq!(config.wait, Duration::from_millis(15));
        assert!(!config.is_full(10_000));
    }

    #[test]
    #[serial]
    fn test_zero_wait_is_rejected() {
        env::set_var("LOADER_WAIT_MS", "0");
        let result = LoaderConfig::from_env();
        env::remove_var("LOADER_WAIT_MS");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_is_full() {
        let config = LoaderConfig::default().with_max_batch(2);
        assert!(!config.is_full(1));
        assert!(config.is_full(2));
    }
}
