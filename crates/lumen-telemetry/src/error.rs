#![forbid(unsafe_code)]

use thiserror::Error;

/// Metrics sink write failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsWriteError {
    /// Transient; worth one deferred retry.
    #[error("retryable metrics write failure: {0}")]
    Retryable(String),
    /// Permanent; the record is dropped.
    #[error("fatal metrics write failure: {0}")]
    Fatal(String),
}

impl MetricsWriteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

pub type MetricsResult<T> = Result<T, MetricsWriteError>;
