#![forbid(unsafe_code)]

use lumen_abr::{NetworkClass, QualityDecision, QualityLevel};
use lumen_core::{MediaId, SessionId};
use web_time::{Instant, SystemTime};

use crate::record::{FailedSwitchEntry, PlaybackSessionRecord, unix_millis};

/// Position jumps larger than this between two `timeupdate`s are seeks.
const SEEK_THRESHOLD_SECS: f64 = 2.0;

/// Watched time and furthest position from `timeupdate` positions.
#[derive(Clone, Copy, Debug, Default)]
struct WatchProgress {
    last_position: Option<f64>,
    watched_secs: f64,
    furthest_secs: f64,
    duration_secs: Option<f64>,
}

impl WatchProgress {
    /// Returns `true` when the move from the previous position was a seek.
    fn advance(&mut self, position: f64) -> bool {
        if !position.is_finite() || position < 0.0 {
            return false;
        }
        let seeked = match self.last_position {
            Some(last) => {
                let delta = position - last;
                if (0.0..=SEEK_THRESHOLD_SECS).contains(&delta) {
                    self.watched_secs += delta;
                    false
                } else {
                    true
                }
            }
            None => false,
        };
        self.last_position = Some(position);
        self.furthest_secs = self.furthest_secs.max(position);
        seeked
    }

    fn completion_percentage(&self) -> f64 {
        match self.duration_secs {
            Some(d) if d > 0.0 => (self.furthest_secs / d * 100.0).clamp(0.0, 100.0),
            _ => 0.0,
        }
    }
}

/// Collects performance metrics for one media load.
///
/// Created on `loadstart`; [`stop`](Self::stop) yields the record exactly once.
#[derive(Clone, Debug)]
pub struct PerformanceTelemetrySession {
    session_id: SessionId,
    media_id: MediaId,
    started_at: Instant,
    started_at_ms: u64,
    network_at_start: NetworkClass,
    load_time_ms: Option<u64>,
    buffer_events: u32,
    switches: u32,
    initial_level: Option<QualityLevel>,
    final_level: Option<QualityLevel>,
    cache_hit: bool,
    errors: u32,
    failed_switches: Vec<FailedSwitchEntry>,
    terminal_error: Option<String>,
    progress: WatchProgress,
    stopped: bool,
}

impl PerformanceTelemetrySession {
    pub fn start(media_id: MediaId, network_at_start: NetworkClass, now: Instant) -> Self {
        let session_id = SessionId::generate();
        tracing::debug!(%session_id, %media_id, network = %network_at_start, "telemetry session started");
        Self {
            session_id,
            media_id,
            started_at: now,
            started_at_ms: unix_millis(SystemTime::now()),
            network_at_start,
            load_time_ms: None,
            buffer_events: 0,
            switches: 0,
            initial_level: None,
            final_level: None,
            cache_hit: false,
            errors: 0,
            failed_switches: Vec::new(),
            terminal_error: None,
            progress: WatchProgress::default(),
            stopped: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn media_id(&self) -> &MediaId {
        &self.media_id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn buffer_event_count(&self) -> u32 {
        self.buffer_events
    }

    pub fn quality_switch_count(&self) -> u32 {
        self.switches
    }

    pub fn failed_switches(&self) -> &[FailedSwitchEntry] {
        &self.failed_switches
    }

    pub fn terminal_error(&self) -> Option<&str> {
        self.terminal_error.as_deref()
    }

    fn offset_ms(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.started_at).as_millis()).unwrap_or(u64::MAX)
    }

    /// Every decision the engine emits. The first one fixes the initial level.
    pub fn on_decision(&mut self, decision: &QualityDecision) {
        if self.stopped {
            return;
        }
        if self.initial_level.is_none() {
            self.initial_level = Some(decision.from_level);
            self.final_level = Some(decision.from_level);
        }
        if !decision.should_switch {
            self.final_level = Some(decision.to_level);
        }
    }

    /// A switch whose rendition resolved and is now playing.
    pub fn on_switch_committed(&mut self, decision: &QualityDecision) {
        if self.stopped {
            return;
        }
        self.switches = self.switches.saturating_add(1);
        self.final_level = Some(decision.to_level);
    }

    pub fn on_switch_failed(&mut self, decision: &QualityDecision, error: impl Into<String>, now: Instant) {
        if self.stopped {
            return;
        }
        let entry = FailedSwitchEntry {
            from_level: decision.from_level,
            to_level: decision.to_level,
            reason: decision.reason,
            error: error.into(),
            at_ms: self.offset_ms(now),
        };
        tracing::debug!(session_id = %self.session_id, to = %entry.to_level, error = %entry.error, "failed switch recorded");
        self.failed_switches.push(entry);
    }

    /// `waiting` event.
    pub fn on_buffering(&mut self) {
        if !self.stopped {
            self.buffer_events = self.buffer_events.saturating_add(1);
        }
    }

    /// Player error; a fatal one ends the session with `message` as terminal error.
    pub fn on_error(&mut self, message: &str, fatal: bool) {
        if self.stopped {
            return;
        }
        self.errors = self.errors.saturating_add(1);
        if fatal && self.terminal_error.is_none() {
            self.terminal_error = Some(message.to_owned());
        }
    }

    /// First `canplaythrough`; later calls keep the first load time.
    pub fn mark_loaded(&mut self, now: Instant) {
        if self.load_time_ms.is_none() && !self.stopped {
            self.load_time_ms = Some(self.offset_ms(now));
        }
    }

    pub fn mark_cache_hit(&mut self, hit: bool) {
        self.cache_hit |= hit;
    }

    pub fn set_duration(&mut self, duration_secs: f64) {
        if duration_secs.is_finite() && duration_secs > 0.0 {
            self.progress.duration_secs = Some(duration_secs);
        }
    }

    /// `timeupdate` position. Returns `true` when the jump looks like a seek.
    pub fn on_time_update(&mut self, position_secs: f64) -> bool {
        if self.stopped {
            return false;
        }
        self.progress.advance(position_secs)
    }

    pub fn watch_duration_seconds(&self) -> f64 {
        self.progress.watched_secs
    }

    pub fn completion_percentage(&self) -> f64 {
        self.progress.completion_percentage()
    }

    /// End the session with explicit totals. Returns `None` after the first call.
    pub fn stop(
        &mut self,
        watch_duration_seconds: f64,
        completion_percentage: f64,
    ) -> Option<PlaybackSessionRecord> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        let record = PlaybackSessionRecord {
            session_id: self.session_id,
            media_id: self.media_id.clone(),
            started_at_ms: self.started_at_ms,
            load_time_ms: self.load_time_ms,
            buffer_event_count: self.buffer_events,
            quality_switch_count: self.switches,
            initial_level: self.initial_level,
            final_level: self.final_level,
            watch_duration_seconds: sanitize(watch_duration_seconds).max(0.0),
            completion_percentage: sanitize(completion_percentage).clamp(0.0, 100.0),
            network_quality_at_start: self.network_at_start,
            cache_hit: self.cache_hit,
            error_count: self.errors,
            failed_switches: std::mem::take(&mut self.failed_switches),
            terminal_error: self.terminal_error.clone(),
        };
        tracing::debug!(
            session_id = %record.session_id,
            switches = record.quality_switch_count,
            stalls = record.buffer_event_count,
            watched = record.watch_duration_seconds,
            "telemetry session stopped"
        );
        Some(record)
    }

    /// End the session with the totals tracked from `timeupdate`s.
    pub fn finish(&mut self) -> Option<PlaybackSessionRecord> {
        let watched = self.watch_duration_seconds();
        let completion = self.completion_percentage();
        self.stop(watched, completion)
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}
