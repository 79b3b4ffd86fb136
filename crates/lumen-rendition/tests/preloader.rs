#![forbid(unsafe_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use lumen_abr::{DecisionReason, QualityDecision, QualityLevel, RenditionParams};
use lumen_core::{EpochCounter, SourceRef};
use lumen_rendition::{
    PreloadOutcome, RenditionCatalog, RenditionPreloader, ResolutionError, ResolutionResult,
    SignedUrl, StorageUrlResolver, SwitchPlan, UrlCache,
};
use rstest::{fixture, rstest};
use url::Url;
use web_time::Instant;

/// Signer that sleeps before answering and can be told to fail.
#[derive(Default)]
struct SlowSigner {
    delay: Duration,
    fail_heights: Vec<u32>,
    calls: AtomicUsize,
}

#[async_trait]
impl StorageUrlResolver for SlowSigner {
    async fn sign(&self, source: &SourceRef, params: RenditionParams) -> ResolutionResult<SignedUrl> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail_heights.contains(&params.target_height) {
            return Err(ResolutionError::Expired);
        }
        let url = Url::parse(&format!("https://cdn.example.com/{source}/{}", params.target_height))
            .map_err(|e| ResolutionError::unavailable(e.to_string()))?;
        Ok(SignedUrl::new(url, Duration::from_secs(600)))
    }
}

fn decision(from: QualityLevel, to: QualityLevel) -> QualityDecision {
    QualityDecision {
        from_level: from,
        to_level: to,
        should_switch: from != to,
        reason: DecisionReason::UpgradeStable,
        decided_at: Instant::now(),
    }
}

#[fixture]
fn epochs() -> EpochCounter {
    EpochCounter::new()
}

fn preloader(signer: Arc<SlowSigner>) -> RenditionPreloader {
    RenditionPreloader::new(RenditionCatalog::new(signer, UrlCache::default()))
}

#[rstest]
#[tokio::test]
async fn ready_when_target_resolves(epochs: EpochCounter) {
    let signer = Arc::new(SlowSigner::default());
    let preloader = preloader(signer.clone());
    let plan = SwitchPlan {
        decision: decision(QualityLevel::P480, QualityLevel::P720),
        source: SourceRef::new("clip"),
        epoch: epochs.advance(),
    };

    match preloader.preload(&plan).await {
        PreloadOutcome::Ready(resolved) => {
            assert_eq!(resolved.level, QualityLevel::P720);
            assert_eq!(resolved.url.path(), "/clip/720");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn failure_is_reported_not_applied(epochs: EpochCounter) {
    let signer = Arc::new(SlowSigner {
        fail_heights: vec![720],
        ..SlowSigner::default()
    });
    let plan = SwitchPlan {
        decision: decision(QualityLevel::P480, QualityLevel::P720),
        source: SourceRef::new("clip"),
        epoch: epochs.advance(),
    };
    assert_eq!(
        preloader(signer).preload(&plan).await,
        PreloadOutcome::Failed(ResolutionError::Expired)
    );
}

#[rstest]
#[tokio::test]
async fn hold_decisions_are_skipped(epochs: EpochCounter) {
    let signer = Arc::new(SlowSigner::default());
    let plan = SwitchPlan {
        decision: decision(QualityLevel::P480, QualityLevel::P480),
        source: SourceRef::new("clip"),
        epoch: epochs.advance(),
    };
    assert_eq!(preloader(signer.clone()).preload(&plan).await, PreloadOutcome::Skipped);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn superseded_generation_is_stale(epochs: EpochCounter) {
    let signer = Arc::new(SlowSigner {
        delay: Duration::from_secs(30),
        ..SlowSigner::default()
    });
    let preloader = preloader(signer);
    let plan = SwitchPlan {
        decision: decision(QualityLevel::P480, QualityLevel::P720),
        source: SourceRef::new("clip"),
        epoch: epochs.advance(),
    };

    let task = tokio::spawn(async move { preloader.preload(&plan).await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    epochs.advance();

    assert_eq!(task.await.unwrap(), PreloadOutcome::Stale);
}

#[rstest]
#[tokio::test]
async fn neighbours_warm_the_cache(epochs: EpochCounter) {
    let signer = Arc::new(SlowSigner::default());
    let preloader = preloader(signer.clone());
    let source = SourceRef::new("clip");
    let epoch = epochs.advance();

    assert_eq!(preloader.warm_neighbors(QualityLevel::P720, &source, &epoch).await, 2);
    assert_eq!(preloader.warm_neighbors(QualityLevel::P360, &source, &epoch).await, 1);
    assert_eq!(preloader.catalog().cache().len(), 2);

    let plan = SwitchPlan {
        decision: decision(QualityLevel::P720, QualityLevel::P1080),
        source,
        epoch,
    };
    match preloader.preload(&plan).await {
        PreloadOutcome::Ready(resolved) => assert!(resolved.from_cache),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
}
