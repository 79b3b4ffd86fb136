//! Rendition URL resolution for quality switches.
//!
//! [`RenditionCatalog`] maps a [`QualityLevel`](lumen_abr::QualityLevel) to its
//! transform parameters and asks a [`StorageUrlResolver`] for a signed URL,
//! keeping results in a shared [`UrlCache`] until they expire.
//! [`RenditionPreloader`] resolves a switch target before the player source
//! changes, so a failed resolution never interrupts playback.

#![forbid(unsafe_code)]

mod cache;
mod catalog;
mod error;
mod preloader;
mod resolver;
mod retry;

pub use cache::UrlCache;
pub use catalog::{RenditionCatalog, ResolvedUrl};
pub use error::{ResolutionError, ResolutionResult};
pub use preloader::{PreloadOutcome, RenditionPreloader, SwitchPlan};
pub use resolver::{ResolverExt, SignedUrl, StorageUrlResolver};
pub use retry::RetryResolver;
