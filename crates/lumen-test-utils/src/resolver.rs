#![forbid(unsafe_code)]

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use lumen_abr::{QualityLevel, RenditionParams};
use lumen_core::SourceRef;
use lumen_rendition::{ResolutionError, ResolutionResult, SignedUrl, StorageUrlResolver};
use parking_lot::Mutex;
use url::Url;

/// Signer with scripted failures per level.
///
/// Queued failures for a level are returned first, one per call; afterwards
/// the level signs `https://cdn.test/{source}/{height}?q={quality}`.
#[derive(Debug)]
pub struct FakeResolver {
    ttl: Duration,
    delay: Duration,
    failures: Mutex<Vec<(QualityLevel, VecDeque<ResolutionError>)>>,
    calls: Mutex<Vec<(SourceRef, QualityLevel)>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            delay: Duration::ZERO,
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue `error` for the next signing of `level`.
    pub fn fail_next(&self, level: QualityLevel, error: ResolutionError) {
        let mut failures = self.failures.lock();
        match failures.iter_mut().find(|(l, _)| *l == level) {
            Some((_, queue)) => queue.push_back(error),
            None => failures.push((level, VecDeque::from([error]))),
        }
    }

    pub fn calls(&self) -> Vec<(SourceRef, QualityLevel)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, level: QualityLevel) -> usize {
        self.calls.lock().iter().filter(|(_, l)| *l == level).count()
    }

    fn next_failure(&self, level: QualityLevel) -> Option<ResolutionError> {
        self.failures
            .lock()
            .iter_mut()
            .find(|(l, _)| *l == level)
            .and_then(|(_, queue)| queue.pop_front())
    }
}

impl Default for FakeResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageUrlResolver for FakeResolver {
    async fn sign(&self, source: &SourceRef, params: RenditionParams) -> ResolutionResult<SignedUrl> {
        let level = QualityLevel::from_params(params)
            .ok_or_else(|| ResolutionError::unavailable("unknown rendition"))?;
        self.calls.lock().push((source.clone(), level));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = self.next_failure(level) {
            return Err(error);
        }
        let url = Url::parse(&format!(
            "https://cdn.test/{source}/{}?q={}",
            params.target_height, params.encode_quality
        ))
        .map_err(|e| ResolutionError::unavailable(e.to_string()))?;
        Ok(SignedUrl::new(url, self.ttl))
    }
}
