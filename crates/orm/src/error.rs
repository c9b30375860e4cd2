//! Error types for the statement layer

use tally_core::ConfigError;
use thiserror::Error;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for ORM operations
///
/// `Clone` so a single failure can be handed to every caller waiting on the
/// same batched read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrmError {
    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),
    /// Statement building error
    #[error("Query error: {0}")]
    Query(String),
    /// Schema lookup error
    #[error("Schema error: {0}")]
    Schema(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Record not found in table
    #[error("Record not found in table '{0}'")]
    NotFound(String),
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for OrmError {
    fn from(err: ConfigError) -> Self {
        OrmError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrmError::Database("connection refused".to_string());
        assert_eq!(err.to_string(), "Database error: connection refused");

        let err = OrmError::NotFound("invoices".to_string());
        assert_eq!(err.to_string(), "Record not found in table 'invoices'");
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<i64>("not a number").unwrap_err();
        match OrmError::from(serde_err) {
            OrmError::Serialization(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Serialization error, got {:?}", other),
        }
    }
}
