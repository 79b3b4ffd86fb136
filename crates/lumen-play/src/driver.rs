#![forbid(unsafe_code)]

use std::sync::Arc;

use lumen_abr::QualityLevel;
use lumen_core::{Epoch, MediaId, SessionId, SourceRef};
use lumen_events::Event;
use lumen_rendition::{RenditionCatalog, RenditionPreloader, ResolvedUrl, StorageUrlResolver};
use lumen_telemetry::{BehaviorRecorder, FlushOutcome, FlushTicket, MetricsSink, TelemetryFlusher};
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use web_time::Instant;

use crate::{
    config::PlaybackConfig,
    controller::{ControllerAction, LoadPlan, PlaybackController, SwitchResult},
    error::{PlayError, PlayResult},
    host::{ConnectivityProbe, MediaClock, MediaEvent},
};

/// Session record being written in the background.
#[derive(Debug)]
pub struct PendingFlush {
    session_id: SessionId,
    task: JoinHandle<FlushOutcome>,
}

impl PendingFlush {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait until the sink accepted or dropped the record.
    pub async fn outcome(self) -> FlushOutcome {
        let Self { session_id, task } = self;
        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%session_id, %error, "metrics flush task failed");
                FlushOutcome::Cancelled
            }
        }
    }
}

/// What the driver did for one controller call.
///
/// Session flushes keep running after the call returns; dropping the report
/// does not cancel them.
#[derive(Debug, Default)]
pub struct DriverReport {
    pub switches: Vec<SwitchResult>,
    pub flushes: Vec<PendingFlush>,
}

impl DriverReport {
    /// URL the player source should be swapped to, if a switch was applied.
    pub fn applied(&self) -> Option<&ResolvedUrl> {
        self.switches.iter().rev().find_map(|s| match s {
            SwitchResult::Applied(url) => Some(url),
            _ => None,
        })
    }

    /// Wait for every flush started by this call.
    pub async fn join_flushes(&mut self) -> Vec<FlushOutcome> {
        let mut outcomes = Vec::with_capacity(self.flushes.len());
        for flush in self.flushes.drain(..) {
            outcomes.push(flush.outcome().await);
        }
        outcomes
    }
}

/// Async shell around a [`PlaybackController`].
///
/// The controller lock is never held across an await: the controller hands
/// out actions, the driver performs them and feeds the results back. Metrics
/// writes run on their own tasks so a slow sink never holds up playback.
#[derive(Clone)]
pub struct PlaybackDriver {
    controller: Arc<Mutex<PlaybackController>>,
    clock: Arc<dyn MediaClock>,
    preloader: RenditionPreloader,
    flusher: TelemetryFlusher,
    recorder: BehaviorRecorder,
    warm_neighbors: bool,
}

impl PlaybackDriver {
    pub fn new(
        config: PlaybackConfig,
        clock: Arc<dyn MediaClock>,
        probe: Arc<dyn ConnectivityProbe>,
        catalog: RenditionCatalog,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        let controller = PlaybackController::new(&config, Arc::clone(&clock), probe);
        let flusher = TelemetryFlusher::new(Arc::clone(&sink), config.flush_retry.clone())
            .with_bus(controller.bus().clone());
        let recorder = BehaviorRecorder::new(
            sink,
            config.flush_retry.clone(),
            config.device.clone(),
            config.page.clone(),
        );
        Self {
            controller: Arc::new(Mutex::new(controller)),
            clock,
            preloader: RenditionPreloader::new(catalog),
            flusher,
            recorder,
            warm_neighbors: config.warm_neighbors,
        }
    }

    /// Build the catalog from `resolver` with the configured retry and cache.
    pub fn with_resolver<R>(
        config: PlaybackConfig,
        clock: Arc<dyn MediaClock>,
        probe: Arc<dyn ConnectivityProbe>,
        resolver: R,
        sink: Arc<dyn MetricsSink>,
    ) -> Self
    where
        R: StorageUrlResolver + 'static,
    {
        let catalog =
            RenditionCatalog::with_retry(resolver, config.resolve_retry.clone(), config.url_cache());
        Self::new(config, clock, probe, catalog, sink)
    }

    pub fn controller(&self) -> &Arc<Mutex<PlaybackController>> {
        &self.controller
    }

    pub fn catalog(&self) -> &RenditionCatalog {
        self.preloader.catalog()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.controller.lock().subscribe()
    }

    pub fn current_level(&self) -> QualityLevel {
        self.controller.lock().current_level()
    }

    pub fn recommended_level(&self) -> QualityLevel {
        self.controller.lock().recommended_level()
    }

    pub fn is_auto_mode(&self) -> bool {
        self.controller.lock().is_auto_mode()
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Load `media_id` and resolve its initial rendition.
    ///
    /// The previous session's flush is started but not awaited.
    pub async fn load(&self, media_id: MediaId, source: SourceRef) -> PlayResult<ResolvedUrl> {
        let now = self.now();
        let actions = self.controller.lock().load(media_id, source, now);
        let mut plan = None;
        let mut rest = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                ControllerAction::Load(p) => plan = Some(p),
                other => rest.push(other),
            }
        }
        self.run(rest).await;
        let plan = plan.ok_or(PlayError::NotLoaded)?;
        self.resolve_initial(&plan).await
    }

    async fn resolve_initial(&self, plan: &LoadPlan) -> PlayResult<ResolvedUrl> {
        let resolved = tokio::select! {
            biased;
            () = plan.epoch.cancelled() => return Err(PlayError::Superseded),
            r = self.preloader.catalog().resolve(plan.level, &plan.source) => r?,
        };
        if !self.controller.lock().complete_load(plan, &resolved) {
            return Err(PlayError::Superseded);
        }
        if self.warm_neighbors {
            self.spawn_warm_up(plan.level, plan.source.clone(), plan.epoch.clone());
        }
        Ok(resolved)
    }

    pub async fn on_media_event(&self, event: MediaEvent) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().on_media_event(event, now);
        self.run(actions).await
    }

    pub async fn on_connectivity_change(&self) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().on_connectivity_change(now);
        self.run(actions).await
    }

    pub async fn set_manual_quality(&self, level: QualityLevel) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().set_manual_quality(level, now);
        self.run(actions).await
    }

    pub async fn enable_auto_mode(&self) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().enable_auto_mode(now);
        self.run(actions).await
    }

    pub async fn end_session(&self) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().end_session(now);
        self.run(actions).await
    }

    pub async fn teardown(&self) -> DriverReport {
        let now = self.now();
        let actions = self.controller.lock().teardown(now);
        self.run(actions).await
    }

    async fn run(&self, actions: Vec<ControllerAction>) -> DriverReport {
        let mut report = DriverReport::default();
        for action in actions {
            match action {
                ControllerAction::Switch(plan) => {
                    let outcome = self.preloader.preload(&plan).await;
                    let now = self.now();
                    let result = self.controller.lock().complete_switch(&plan, outcome, now);
                    if let SwitchResult::Applied(url) = &result {
                        if self.warm_neighbors {
                            self.spawn_warm_up(url.level, plan.source.clone(), plan.epoch.clone());
                        }
                    }
                    report.switches.push(result);
                }
                ControllerAction::Flush(ticket) => {
                    report.flushes.push(self.spawn_flush(ticket));
                }
                ControllerAction::Behavior(b) => {
                    let event = self
                        .recorder
                        .event(b.session_id, b.media_id, b.kind, b.position_seconds);
                    self.recorder.record(event, &b.epoch);
                }
                ControllerAction::Load(plan) => {
                    tracing::debug!(media_id = %plan.media_id, "unexpected load plan outside load()");
                }
            }
        }
        report
    }

    fn spawn_flush(&self, ticket: FlushTicket) -> PendingFlush {
        let session_id = ticket.session_id();
        let flusher = self.flusher.clone();
        let task = tokio::spawn(async move { flusher.flush(ticket).await });
        PendingFlush { session_id, task }
    }

    fn spawn_warm_up(&self, level: QualityLevel, source: SourceRef, epoch: Epoch) {
        let preloader = self.preloader.clone();
        tokio::spawn(async move {
            let warmed = preloader.warm_neighbors(level, &source, &epoch).await;
            tracing::trace!(%level, warmed, "neighbour renditions warmed");
        });
    }
}

impl std::fmt::Debug for PlaybackDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDriver")
            .field("warm_neighbors", &self.warm_neighbors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use lumen_abr::RenditionParams;
    use lumen_rendition::{ResolutionError, ResolutionResult, SignedUrl, UrlCache};
    use lumen_telemetry::{MetricsRecord, MetricsResult};
    use url::Url;

    use super::*;
    use crate::host::NoConnectivity;

    struct StillClock;

    impl MediaClock for StillClock {
        fn buffered_end(&self) -> f64 {
            0.0
        }

        fn current_position(&self) -> f64 {
            0.0
        }

        fn duration(&self) -> Option<f64> {
            None
        }
    }

    struct Signer;

    #[async_trait]
    impl StorageUrlResolver for Signer {
        async fn sign(&self, source: &SourceRef, params: RenditionParams) -> ResolutionResult<SignedUrl> {
            let url = Url::parse(&format!("https://cdn.example.com/{source}/{}", params.target_height))
                .map_err(|e| ResolutionError::unavailable(e.to_string()))?;
            Ok(SignedUrl::new(url, Duration::from_secs(600)))
        }
    }

    /// Sink that takes `delay` to accept anything.
    #[derive(Default)]
    struct SlowSink {
        delay: Duration,
        accepted: Mutex<Vec<MetricsRecord>>,
    }

    #[async_trait]
    impl MetricsSink for SlowSink {
        async fn write(&self, record: MetricsRecord) -> MetricsResult<()> {
            tokio::time::sleep(self.delay).await;
            self.accepted.lock().push(record);
            Ok(())
        }
    }

    fn driver(sink: Arc<SlowSink>) -> PlaybackDriver {
        PlaybackDriver::with_resolver(
            PlaybackConfig::default().with_warm_neighbors(false),
            Arc::new(StillClock),
            Arc::new(NoConnectivity),
            Signer,
            sink,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn next_load_does_not_wait_for_the_previous_flush() {
        let sink = Arc::new(SlowSink {
            delay: Duration::from_secs(30),
            ..SlowSink::default()
        });
        let driver = driver(Arc::clone(&sink));
        driver.load(MediaId::new("a"), SourceRef::new("a")).await.unwrap();

        let started = tokio::time::Instant::now();
        let url = driver.load(MediaId::new("b"), SourceRef::new("b")).await.unwrap();
        assert_eq!(url.level, QualityLevel::P480);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(sink.accepted.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.accepted.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn end_session_hands_back_a_pending_flush() {
        let sink = Arc::new(SlowSink {
            delay: Duration::from_secs(5),
            ..SlowSink::default()
        });
        let driver = driver(Arc::clone(&sink));
        driver.load(MediaId::new("a"), SourceRef::new("a")).await.unwrap();

        let mut report = driver.end_session().await;
        assert_eq!(report.flushes.len(), 1);
        assert!(sink.accepted.lock().is_empty());
        assert_eq!(report.join_flushes().await, vec![FlushOutcome::Written { attempts: 1 }]);
        assert!(report.flushes.is_empty());
    }
}
