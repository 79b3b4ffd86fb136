#![forbid(unsafe_code)]

use lumen_rendition::ResolutionError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlayError {
    #[error("no media loaded")]
    NotLoaded,

    #[error("load superseded by a newer one")]
    Superseded,

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

pub type PlayResult<T> = Result<T, PlayError>;
