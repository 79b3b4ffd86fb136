#![forbid(unsafe_code)]

use thiserror::Error;

/// Why a rendition URL could not be produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("rendition unavailable: {0}")]
    Unavailable(String),
    #[error("signed URL expired")]
    Expired,
    #[error("access denied: {0}")]
    Denied(String),
}

impl ResolutionError {
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn denied<S: Into<String>>(msg: S) -> Self {
        Self::Denied(msg.into())
    }

    /// Transient failures that a single retry may fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Expired => true,
            Self::Denied(_) => false,
        }
    }
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;
