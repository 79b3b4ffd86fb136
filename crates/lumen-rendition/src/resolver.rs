#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use lumen_abr::RenditionParams;
use lumen_core::{RetryPolicy, SourceRef};
#[cfg(test)]
use mockall::automock;
use url::Url;
use web_time::Instant;

use crate::{error::ResolutionResult, retry::RetryResolver};

/// Time-limited URL returned by the storage signer.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedUrl {
    pub url: Url,
    pub expires_at: Instant,
}

impl SignedUrl {
    pub fn new(url: Url, ttl: Duration) -> Self {
        Self {
            url,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Valid at `now`, keeping `margin` of headroom before expiry.
    pub fn is_valid_at(&self, now: Instant, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Storage-layer URL signer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageUrlResolver: Send + Sync {
    /// Sign a playable URL for `source` transformed with `params`.
    async fn sign(&self, source: &SourceRef, params: RenditionParams) -> ResolutionResult<SignedUrl>;
}

pub trait ResolverExt: StorageUrlResolver + Sized {
    /// Add the bounded retry layer.
    fn with_retry(self, policy: RetryPolicy) -> RetryResolver<Self> {
        RetryResolver::new(self, policy)
    }
}

impl<T: StorageUrlResolver> ResolverExt for T {}
