#![forbid(unsafe_code)]

use std::sync::Arc;

use lumen_abr::{
    BufferHealthMonitor, ControllerMode, DecisionReason, NetworkQualityClassifier, NetworkSample,
    QualityDecision, QualityDecisionEngine, QualityLevel,
};
use lumen_core::{Epoch, EpochCounter, MediaId, SessionId, SourceRef};
use lumen_events::{Event, EventBus, QualityEvent, TelemetryEvent};
use lumen_rendition::{PreloadOutcome, ResolutionError, ResolvedUrl, SwitchPlan};
use lumen_telemetry::{BehaviorKind, FlushTicket, PerformanceTelemetrySession};
use tokio::sync::broadcast;
use web_time::Instant;

use crate::{
    config::PlaybackConfig,
    host::{ConnectivityProbe, MediaClock, MediaEvent},
};

/// Initial rendition to resolve for a freshly loaded media item.
#[derive(Clone, Debug)]
pub struct LoadPlan {
    pub media_id: MediaId,
    pub source: SourceRef,
    pub level: QualityLevel,
    pub epoch: Epoch,
}

/// Behavior event to hand to the recorder.
#[derive(Clone, Debug)]
pub struct BehaviorAction {
    pub session_id: SessionId,
    pub media_id: MediaId,
    pub kind: BehaviorKind,
    pub position_seconds: f64,
    pub epoch: Epoch,
}

/// Asynchronous work the controller asks its driver to perform.
#[derive(Clone, Debug)]
pub enum ControllerAction {
    Load(LoadPlan),
    Switch(SwitchPlan),
    Flush(FlushTicket),
    Behavior(BehaviorAction),
}

/// How a preloaded switch ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchResult {
    /// Swap the player source to this URL.
    Applied(ResolvedUrl),
    /// The current level stays.
    RolledBack(ResolutionError),
    /// Superseded; nothing changed.
    Ignored,
}

#[derive(Clone, Debug)]
struct LoadedMedia {
    media_id: MediaId,
    source: SourceRef,
    epoch: Epoch,
    /// Ended or failed fatally; no further decisions.
    finished: bool,
}

/// Translates player events into quality decisions and session telemetry.
///
/// One controller per playback surface. Every method is synchronous; work that
/// needs I/O is returned as [`ControllerAction`]s and fed back through
/// [`complete_switch`](Self::complete_switch).
pub struct PlaybackController {
    engine: QualityDecisionEngine,
    monitor: BufferHealthMonitor,
    classifier: NetworkQualityClassifier,
    clock: Arc<dyn MediaClock>,
    probe: Arc<dyn ConnectivityProbe>,
    bus: EventBus,
    epochs: EpochCounter,
    media: Option<LoadedMedia>,
    session: Option<PerformanceTelemetrySession>,
    sample: Option<NetworkSample>,
}

impl PlaybackController {
    pub fn new(
        config: &PlaybackConfig,
        clock: Arc<dyn MediaClock>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            engine: QualityDecisionEngine::new(config.abr.clone()),
            monitor: BufferHealthMonitor::new(),
            classifier: NetworkQualityClassifier::new(config.abr.classifier.clone()),
            clock,
            probe,
            bus: config.event_bus(),
            epochs: EpochCounter::new(),
            media: None,
            session: None,
            sample: None,
        }
    }

    pub fn current_level(&self) -> QualityLevel {
        self.engine.current_level()
    }

    pub fn recommended_level(&self) -> QualityLevel {
        self.engine.recommended_level()
    }

    pub fn is_auto_mode(&self) -> bool {
        self.engine.is_auto_mode()
    }

    pub fn mode(&self) -> ControllerMode {
        self.engine.mode()
    }

    pub fn last_decision(&self) -> Option<&QualityDecision> {
        self.engine.last_decision()
    }

    pub fn engine(&self) -> &QualityDecisionEngine {
        &self.engine
    }

    pub fn session(&self) -> Option<&PerformanceTelemetrySession> {
        self.session.as_ref()
    }

    pub fn media_id(&self) -> Option<&MediaId> {
        self.media.as_ref().map(|m| &m.media_id)
    }

    /// Epoch of the loaded media.
    pub fn epoch(&self) -> Epoch {
        self.epochs.current()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Decision-changed and telemetry notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    fn refresh_sample(&mut self, now: Instant) -> NetworkSample {
        let sample = self
            .classifier
            .classify_reading(self.probe.current_sample(), now);
        self.sample = Some(sample);
        sample
    }

    fn active_media(&self) -> Option<&LoadedMedia> {
        self.media.as_ref().filter(|m| !m.finished)
    }

    /// Start playing `media_id`. Ends the previous session and cancels all of
    /// its in-flight work.
    pub fn load(&mut self, media_id: MediaId, source: SourceRef, now: Instant) -> Vec<ControllerAction> {
        let mut actions = self.finish_session(None, now);

        let epoch = self.epochs.advance();
        self.monitor.on_load_start();
        let sample = self.refresh_sample(now);
        let decision = self.engine.start(&sample, &self.monitor.state(), now);

        let mut session = PerformanceTelemetrySession::start(media_id.clone(), sample.class, now);
        session.on_decision(&decision);
        self.bus.publish(TelemetryEvent::SessionStarted {
            session_id: session.session_id(),
            media_id: media_id.clone(),
        });
        self.session = Some(session);

        tracing::debug!(%media_id, level = %decision.to_level, epoch = epoch.id(), "media loaded");
        self.bus.publish(QualityEvent::MediaLoaded {
            media_id: media_id.clone(),
            level: decision.to_level,
        });
        self.bus.publish(QualityEvent::DecisionChanged {
            decision,
            terminal: None,
        });

        self.media = Some(LoadedMedia {
            media_id: media_id.clone(),
            source: source.clone(),
            epoch: epoch.clone(),
            finished: false,
        });
        actions.push(ControllerAction::Load(LoadPlan {
            media_id,
            source,
            level: decision.to_level,
            epoch,
        }));
        actions
    }

    /// Record whether the initial rendition came from the URL cache.
    pub fn complete_load(&mut self, plan: &LoadPlan, resolved: &ResolvedUrl) -> bool {
        if plan.epoch.is_stale() {
            tracing::trace!(media_id = %plan.media_id, "initial rendition for a stale load");
            return false;
        }
        if let Some(session) = self.session.as_mut() {
            session.mark_cache_hit(resolved.from_cache);
        }
        true
    }

    pub fn on_media_event(&mut self, event: MediaEvent, now: Instant) -> Vec<ControllerAction> {
        if self.active_media().is_none() {
            tracing::trace!(?event, "media event without active media");
            return Vec::new();
        }

        match event {
            MediaEvent::LoadStart => {
                // Also fired by rendition swaps; the session boundary is `load`.
                tracing::trace!("loadstart");
                Vec::new()
            }
            MediaEvent::LoadedMetadata => {
                if let (Some(duration), Some(session)) = (self.clock.duration(), self.session.as_mut()) {
                    session.set_duration(duration);
                }
                Vec::new()
            }
            MediaEvent::Waiting => {
                self.monitor.on_waiting(now);
                if let Some(session) = self.session.as_mut() {
                    session.on_buffering();
                }
                self.evaluate(now)
            }
            MediaEvent::CanPlayThrough => {
                self.monitor.on_can_play_through();
                self.monitor
                    .on_time_update(self.clock.buffered_end(), self.clock.current_position());
                if let Some(session) = self.session.as_mut() {
                    session.mark_loaded(now);
                }
                self.evaluate(now)
            }
            MediaEvent::TimeUpdate => {
                let position = self.clock.current_position();
                self.monitor
                    .on_time_update(self.clock.buffered_end(), position);
                let seeked = self
                    .session
                    .as_mut()
                    .is_some_and(|s| s.on_time_update(position));
                let mut actions: Vec<_> = seeked
                    .then(|| self.behavior(BehaviorKind::Seek))
                    .flatten()
                    .into_iter()
                    .collect();
                actions.extend(self.evaluate(now));
                actions
            }
            MediaEvent::Ended => {
                let position = self.clock.current_position();
                if let Some(session) = self.session.as_mut() {
                    session.on_time_update(position);
                }
                tracing::debug!("playback ended");
                self.finish_session(None, now)
            }
            MediaEvent::Error { message, fatal } => {
                if let Some(session) = self.session.as_mut() {
                    session.on_error(&message, fatal);
                }
                if fatal {
                    tracing::warn!(%message, "fatal playback error");
                    self.finish_session(Some(message), now)
                } else {
                    tracing::debug!(%message, "playback error");
                    Vec::new()
                }
            }
            MediaEvent::Play => self.behavior(BehaviorKind::Play).into_iter().collect(),
            MediaEvent::Pause => self.behavior(BehaviorKind::Pause).into_iter().collect(),
            MediaEvent::Seeked => self.behavior(BehaviorKind::Seek).into_iter().collect(),
            MediaEvent::Fullscreen => self
                .behavior(BehaviorKind::Fullscreen)
                .into_iter()
                .collect(),
        }
    }

    /// Connectivity changed; re-classify and re-evaluate.
    pub fn on_connectivity_change(&mut self, now: Instant) -> Vec<ControllerAction> {
        self.refresh_sample(now);
        if self.active_media().is_none() {
            return Vec::new();
        }
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: Instant) -> Vec<ControllerAction> {
        let sample = match self.sample {
            Some(sample) => sample,
            None => self.refresh_sample(now),
        };
        let buffer = self.monitor.state();
        self.engine
            .evaluate(&sample, &buffer, now)
            .and_then(|decision| self.dispatch(decision))
            .into_iter()
            .collect()
    }

    fn dispatch(&mut self, decision: QualityDecision) -> Option<ControllerAction> {
        if let Some(session) = self.session.as_mut() {
            session.on_decision(&decision);
        }
        self.bus.publish(QualityEvent::DecisionChanged {
            decision,
            terminal: None,
        });
        let media = self.active_media()?;
        decision.should_switch.then(|| {
            ControllerAction::Switch(SwitchPlan {
                decision,
                source: media.source.clone(),
                epoch: media.epoch.clone(),
            })
        })
    }

    pub fn set_manual_quality(&mut self, level: QualityLevel, now: Instant) -> Vec<ControllerAction> {
        let decision = self.engine.set_manual_quality(level, now);
        self.bus.publish(QualityEvent::ModeChanged {
            mode: self.engine.mode(),
        });
        self.dispatch(decision).into_iter().collect()
    }

    pub fn enable_auto_mode(&mut self, now: Instant) -> Vec<ControllerAction> {
        if self.sample.is_none() {
            self.refresh_sample(now);
        }
        let decision = self.engine.enable_auto_mode(now);
        self.bus.publish(QualityEvent::ModeChanged {
            mode: self.engine.mode(),
        });
        self.dispatch(decision).into_iter().collect()
    }

    /// Apply the result of preloading `plan`.
    pub fn complete_switch(&mut self, plan: &SwitchPlan, outcome: PreloadOutcome, now: Instant) -> SwitchResult {
        if plan.epoch.is_stale() {
            tracing::trace!(to = %plan.target(), "switch result for a stale generation dropped");
            return SwitchResult::Ignored;
        }
        let decision = plan.decision;
        match outcome {
            PreloadOutcome::Ready(resolved) => {
                if !self.engine.commit(&decision, now) {
                    return SwitchResult::Ignored;
                }
                self.monitor.on_source_swap();
                if let Some(session) = self.session.as_mut() {
                    session.on_switch_committed(&decision);
                    session.mark_cache_hit(resolved.from_cache);
                }
                self.bus.publish(QualityEvent::SwitchCommitted {
                    from: decision.from_level,
                    to: decision.to_level,
                    decision,
                });
                SwitchResult::Applied(resolved)
            }
            PreloadOutcome::Failed(error) => {
                if !self.engine.reject(&decision) {
                    return SwitchResult::Ignored;
                }
                if let Some(session) = self.session.as_mut() {
                    session.on_switch_failed(&decision, error.to_string(), now);
                }
                self.bus.publish(QualityEvent::SwitchFailed {
                    decision,
                    error: error.to_string(),
                });
                SwitchResult::RolledBack(error)
            }
            PreloadOutcome::Stale | PreloadOutcome::Skipped => SwitchResult::Ignored,
        }
    }

    /// User left the player: record the exit and flush the session.
    pub fn end_session(&mut self, now: Instant) -> Vec<ControllerAction> {
        let mut actions: Vec<_> = self.behavior(BehaviorKind::Exit).into_iter().collect();
        actions.extend(self.finish_session(None, now));
        actions
    }

    /// Tear the surface down. Pending retries and preloads are cancelled; the
    /// final flush is still returned.
    pub fn teardown(&mut self, now: Instant) -> Vec<ControllerAction> {
        let actions = self.end_session(now);
        self.epochs.advance();
        self.media = None;
        actions
    }

    fn behavior(&self, kind: BehaviorKind) -> Option<ControllerAction> {
        let media = self.active_media()?;
        let session = self.session.as_ref()?;
        Some(ControllerAction::Behavior(BehaviorAction {
            session_id: session.session_id(),
            media_id: media.media_id.clone(),
            kind,
            position_seconds: self.clock.current_position(),
            epoch: media.epoch.clone(),
        }))
    }

    /// Stop the session once and hand its record to the flusher.
    fn finish_session(&mut self, terminal: Option<String>, now: Instant) -> Vec<ControllerAction> {
        let Some(media) = self.media.as_mut() else {
            return Vec::new();
        };
        if media.finished {
            return Vec::new();
        }
        media.finished = true;
        let epoch = media.epoch.clone();

        if let Some(message) = terminal {
            let level = self.engine.current_level();
            let reason = self
                .engine
                .last_decision()
                .map_or(DecisionReason::Initial, |d| d.reason);
            self.bus.publish(QualityEvent::DecisionChanged {
                decision: QualityDecision {
                    from_level: level,
                    to_level: level,
                    should_switch: false,
                    reason,
                    decided_at: now,
                },
                terminal: Some(message),
            });
        }

        self.session
            .as_mut()
            .and_then(PerformanceTelemetrySession::finish)
            .map(|record| ControllerAction::Flush(FlushTicket { record, epoch }))
            .into_iter()
            .collect()
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("engine", &self.engine)
            .field("monitor", &self.monitor)
            .field("media", &self.media)
            .finish_non_exhaustive()
    }
}
