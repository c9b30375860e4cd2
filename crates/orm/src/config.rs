//! Database and tenant guard configuration

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;

use tally_core::{env_or_default, parse_env, AppConfigTrait, ConfigError, ConfigSource};

use crate::tenant::DEFAULT_TENANT_COLUMN;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: 30,
        }
    }
}

impl AppConfigTrait for DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingRequired {
            field: "url".to_string(),
            hint: "Set the DATABASE_URL environment variable".to_string(),
        })?;

        let config = Self {
            url,
            max_connections: parse_env(
                "DATABASE_MAX_CONNECTIONS",
                "10",
                "max_connections",
                "positive integer",
            )?,
            min_connections: parse_env(
                "DATABASE_MIN_CONNECTIONS",
                "1",
                "min_connections",
                "non-negative integer",
            )?,
            acquire_timeout: parse_env(
                "DATABASE_ACQUIRE_TIMEOUT",
                "30",
                "acquire_timeout",
                "number of seconds",
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ConfigError::InvalidValue {
                field: "url".to_string(),
                value: self.url.clone(),
                expected: "postgres:// or postgresql:// URL".to_string(),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_connections".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationFailed {
                message: format!(
                    "min_connections ({}) exceeds max_connections ({})",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert("url".to_string(), ConfigSource::of("DATABASE_URL", "<required>"));
        sources.insert(
            "max_connections".to_string(),
            ConfigSource::of("DATABASE_MAX_CONNECTIONS", "10"),
        );
        sources.insert(
            "min_connections".to_string(),
            ConfigSource::of("DATABASE_MIN_CONNECTIONS", "1"),
        );
        sources.insert(
            "acquire_timeout".to_string(),
            ConfigSource::of("DATABASE_ACQUIRE_TIMEOUT", "30"),
        );
        sources
    }
}

/// What the tenant guard does when a context has neither a tenant id nor a
/// bypass flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTenantPolicy {
    /// Leave the statement unfiltered (background and system jobs)
    #[default]
    Allow,
    /// Filter every tenant-scoped statement down to zero rows
    Deny,
}

impl FromStr for MissingTenantPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(MissingTenantPolicy::Allow),
            "deny" => Ok(MissingTenantPolicy::Deny),
            _ => Err(ConfigError::InvalidValue {
                field: "missing_policy".to_string(),
                value: s.to_string(),
                expected: "allow or deny".to_string(),
            }),
        }
    }
}

impl fmt::Display for MissingTenantPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingTenantPolicy::Allow => write!(f, "allow"),
            MissingTenantPolicy::Deny => write!(f, "deny"),
        }
    }
}

/// Tenant guard configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantGuardConfig {
    /// Column holding the owning tenant on every tenant-scoped table
    pub column: String,
    pub missing_policy: MissingTenantPolicy,
}

impl Default for TenantGuardConfig {
    fn default() -> Self {
        Self {
            column: DEFAULT_TENANT_COLUMN.to_string(),
            missing_policy: MissingTenantPolicy::Allow,
        }
    }
}

impl TenantGuardConfig {
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn with_missing_policy(mut self, policy: MissingTenantPolicy) -> Self {
        self.missing_policy = policy;
        self
    }
}

impl AppConfigTrait for TenantGuardConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            column: env_or_default("TENANT_COLUMN", DEFAULT_TENANT_COLUMN),
            missing_policy: env_or_default("TENANT_MISSING_POLICY", "allow").parse()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid = !self.column.is_empty()
            && self
                .column
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid {
            return Err(ConfigError::InvalidValue {
                field: "column".to_string(),
                value: self.column.clone(),
                expected: "non-empty identifier of letters, digits and underscores".to_string(),
            });
        }
        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let mut sources = HashMap::new();
        sources.insert(
            "column".to_string(),
            ConfigSource::of("TENANT_COLUMN", DEFAULT_TENANT_COLUMN),
        );
        sources.insert(
            "missing_policy".to_string(),
            ConfigSource::of("TENANT_MISSING_POLICY", "allow"),
        );
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_database_config_requires_url() {
        env::remove_var("DATABASE_URL");
        match DatabaseConfig::from_env() {
            Err(ConfigError::MissingRequired { field, .. }) => assert_eq!(field, "url"),
            other => panic!("Expected MissingRequired, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_database_config_from_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/tally");
        env::set_var("DATABASE_MAX_CONNECTIONS", "25");
        let config = DatabaseConfig::from_env();
        env::remove_var("DATABASE_URL");
        env::remove_var("DATABASE_MAX_CONNECTIONS");

        let config = config.unwrap();
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.acquire_timeout, 30);
    }

    #[test]
    fn test_database_config_validation() {
        assert!(DatabaseConfig::new("mysql://localhost/tally").validate().is_err());

        let mut config = DatabaseConfig::new("postgres://localhost/tally");
        assert!(config.validate().is_ok());
        config.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_tenant_guard_config_from_env() {
        env::remove_var("TENANT_COLUMN");
        env::set_var("TENANT_MISSING_POLICY", "DENY");
        let config = TenantGuardConfig::from_env();
        env::remove_var("TENANT_MISSING_POLICY");

        let config = config.unwrap();
        assert_eq!(config.column, "business_id");
        assert_eq!(config.missing_policy, MissingTenantPolicy::Deny);
    }

    #[test]
    fn test_tenant_guard_config_rejects_bad_column() {
        let config = TenantGuardConfig::default().with_column("business_id; --");
        assert!(config.validate().is_err());
        assert!("sometimes".parse::<MissingTenantPolicy>().is_err());
    }
}
