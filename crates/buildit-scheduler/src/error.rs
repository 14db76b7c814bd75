//! Scheduler error types.
//!
//! Only infrastructure and configuration problems are errors. An input that
//! cannot be resolved is reported through
//! [`ResolutionFailure`](buildit_core::ResolutionFailure) instead.

use buildit_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("invalid pipeline: {0}")]
    Pipeline(#[from] buildit_core::Error),

    #[error("input '{0}' is not pinned")]
    NotPinned(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
