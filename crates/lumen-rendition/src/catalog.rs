#![forbid(unsafe_code)]

use std::sync::Arc;

use lumen_abr::{QualityLevel, RenditionParams};
use lumen_core::{RetryPolicy, SourceRef};
use url::Url;
use web_time::Instant;

use crate::{
    cache::UrlCache,
    error::{ResolutionError, ResolutionResult},
    resolver::{ResolverExt, StorageUrlResolver},
};

/// Playable URL for one rendition.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedUrl {
    pub url: Url,
    pub level: QualityLevel,
    pub expires_at: Instant,
    /// Served from the shared cache without signing.
    pub from_cache: bool,
}

/// Maps quality levels to rendition parameters and resolves playable URLs.
#[derive(Clone)]
pub struct RenditionCatalog {
    resolver: Arc<dyn StorageUrlResolver>,
    cache: UrlCache,
}

impl RenditionCatalog {
    pub fn new(resolver: Arc<dyn StorageUrlResolver>, cache: UrlCache) -> Self {
        Self { resolver, cache }
    }

    /// Catalog over `resolver` wrapped in the bounded retry layer.
    pub fn with_retry<R>(resolver: R, policy: RetryPolicy, cache: UrlCache) -> Self
    where
        R: StorageUrlResolver + 'static,
    {
        Self::new(Arc::new(resolver.with_retry(policy)), cache)
    }

    pub fn params_for(level: QualityLevel) -> RenditionParams {
        level.params()
    }

    pub fn level_for_params(params: RenditionParams) -> Option<QualityLevel> {
        QualityLevel::from_params(params)
    }

    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    /// Resolve `level` of `source`, signing only on a cache miss.
    pub async fn resolve(&self, level: QualityLevel, source: &SourceRef) -> ResolutionResult<ResolvedUrl> {
        if let Some(cached) = self.cache.get(source, level, Instant::now()) {
            tracing::trace!(%source, %level, "rendition URL cache hit");
            return Ok(ResolvedUrl {
                url: cached.url,
                level,
                expires_at: cached.expires_at,
                from_cache: true,
            });
        }

        let signed = self.resolver.sign(source, Self::params_for(level)).await?;
        let now = Instant::now();
        if signed.expires_at <= now {
            tracing::debug!(%source, %level, "signer returned an already expired URL");
            return Err(ResolutionError::Expired);
        }
        let stored = self.cache.insert_if_absent(source, level, signed, now);
        tracing::debug!(%source, %level, url = %stored.url, "rendition resolved");
        Ok(ResolvedUrl {
            url: stored.url,
            level,
            expires_at: stored.expires_at,
            from_cache: false,
        })
    }
}

impl std::fmt::Debug for RenditionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenditionCatalog")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::resolver::{MockStorageUrlResolver, SignedUrl};

    fn signing_mock(times: usize) -> MockStorageUrlResolver {
        let mut mock = MockStorageUrlResolver::new();
        mock.expect_sign().times(times).returning(|source, params| {
            Ok(SignedUrl::new(
                Url::parse(&format!(
                    "https://cdn.example.com/{source}?h={}&q={}",
                    params.target_height, params.encode_quality
                ))
                .unwrap(),
                Duration::from_secs(300),
            ))
        });
        mock
    }

    #[rstest]
    #[case(QualityLevel::P360, 360, 60)]
    #[case(QualityLevel::P1080, 1080, 85)]
    #[case(QualityLevel::P2160, 2160, 95)]
    fn params_table(#[case] level: QualityLevel, #[case] height: u32, #[case] quality: u8) {
        let params = RenditionCatalog::params_for(level);
        assert_eq!(params.target_height, height);
        assert_eq!(params.encode_quality, quality);
        assert_eq!(RenditionCatalog::level_for_params(params), Some(level));
    }

    #[tokio::test]
    async fn second_resolve_is_a_cache_hit() {
        let catalog = RenditionCatalog::new(Arc::new(signing_mock(1)), UrlCache::default());
        let source = SourceRef::new("upload-1");

        let first = catalog.resolve(QualityLevel::P720, &source).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.url.query(), Some("h=720&q=80"));

        let second = catalog.resolve(QualityLevel::P720, &source).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.url, first.url);
    }

    #[tokio::test]
    async fn already_expired_signature_is_an_error() {
        let mut mock = MockStorageUrlResolver::new();
        mock.expect_sign().times(1).returning(|_, _| {
            Ok(SignedUrl {
                url: Url::parse("https://cdn.example.com/x").unwrap(),
                expires_at: Instant::now(),
            })
        });
        let catalog = RenditionCatalog::new(Arc::new(mock), UrlCache::default());
        let err = catalog
            .resolve(QualityLevel::P480, &SourceRef::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::Expired);
        assert!(catalog.cache().is_empty());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let mut mock = MockStorageUrlResolver::new();
        mock.expect_sign()
            .times(2)
            .returning(|_, _| Err(ResolutionError::denied("no grant")));
        let catalog = RenditionCatalog::new(Arc::new(mock), UrlCache::default());
        let source = SourceRef::new("x");
        for _ in 0..2 {
            assert!(catalog.resolve(QualityLevel::P480, &source).await.is_err());
        }
    }
}
