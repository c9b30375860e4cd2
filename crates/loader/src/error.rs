//! Loader error types

use std::sync::Arc;

use tally_orm::OrmError;
use thiserror::Error;

pub type LoadResult<T> = Result<T, LoadError>;

/// Why a load did not produce a value
///
/// `Clone` because one batch failure is handed to every caller waiting on
/// that batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError {
    #[error("Fetch failed: {0}")]
    Fetch(Arc<OrmError>),

    #[error("Batch failed: {0}")]
    Batch(String),

    /// The owning request was cancelled before the batch resolved
    #[error("Load cancelled")]
    Cancelled,

    #[error("Batch function returned {actual} results for {expected} keys")]
    ResultCountMismatch { expected: usize, actual: usize },

    /// The batch was abandoned without an answer, e.g. on runtime shutdown
    #[error("Batch dropped before resolving")]
    Dropped,
}

impl From<OrmError> for LoadError {
    fn from(err: OrmError) -> Self {
        LoadError::Fetch(Arc::new(err))
    }
}
