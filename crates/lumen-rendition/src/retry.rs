#![forbid(unsafe_code)]

use async_trait::async_trait;
use lumen_abr::RenditionParams;
use lumen_core::{RetryPolicy, SourceRef};
use tokio::time::sleep;

use crate::{
    error::{ResolutionError, ResolutionResult},
    resolver::{SignedUrl, StorageUrlResolver},
};

/// Retry decorator for [`StorageUrlResolver`] implementations.
///
/// Only [`ResolutionError::is_retryable`] failures are retried, at most
/// `policy.max_retries` times.
pub struct RetryResolver<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R: StorageUrlResolver> RetryResolver<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn should_retry(&self, error: &ResolutionError, retry: u32) -> bool {
        retry < self.policy.max_retries && error.is_retryable()
    }
}

#[async_trait]
impl<R: StorageUrlResolver> StorageUrlResolver for RetryResolver<R> {
    async fn sign(&self, source: &SourceRef, params: RenditionParams) -> ResolutionResult<SignedUrl> {
        let mut retry = 0;
        loop {
            match self.inner.sign(source, params).await {
                Ok(url) => return Ok(url),
                Err(error) => {
                    if !self.should_retry(&error, retry) {
                        return Err(error);
                    }
                    retry += 1;
                    tracing::debug!(
                        source = %source,
                        height = params.target_height,
                        retry,
                        %error,
                        "retrying rendition signing"
                    );
                    sleep(self.policy.delay_for_retry(retry)).await;
                }
            }
        }
    }
}
