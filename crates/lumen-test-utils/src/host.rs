#![forbid(unsafe_code)]

use std::time::Duration;

use lumen_abr::{ConnectivityReading, EffectiveType};
use lumen_play::{ConnectivityProbe, MediaClock};
use parking_lot::Mutex;
use web_time::Instant;

#[derive(Clone, Copy, Debug, Default)]
struct Timeline {
    position: f64,
    buffered_end: f64,
    duration: Option<f64>,
}

/// Media clock whose timeline and time are set by the test.
///
/// Time stands still until [`advance`](Self::advance) is called.
#[derive(Debug)]
pub struct ScriptedClock {
    timeline: Mutex<Timeline>,
    now: Mutex<Instant>,
}

impl Default for ScriptedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClock {
    pub fn new() -> Self {
        Self {
            timeline: Mutex::new(Timeline::default()),
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Playhead at `position` with `ahead` seconds buffered beyond it.
    pub fn set(&self, position: f64, ahead: f64) {
        let mut t = self.timeline.lock();
        t.position = position;
        t.buffered_end = position + ahead;
    }

    pub fn set_duration(&self, duration: f64) {
        self.timeline.lock().duration = Some(duration);
    }
}

impl MediaClock for ScriptedClock {
    fn buffered_end(&self) -> f64 {
        self.timeline.lock().buffered_end
    }

    fn current_position(&self) -> f64 {
        self.timeline.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.timeline.lock().duration
    }

    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Connectivity probe whose reading is set by the test.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    reading: Mutex<Option<ConnectivityReading>>,
}

impl ScriptedProbe {
    /// Probe on a 4g connection with `downlink_mbps`.
    pub fn with_downlink(downlink_mbps: f64) -> Self {
        let probe = Self::default();
        probe.set_downlink(downlink_mbps);
        probe
    }

    /// Probe for a platform without connectivity information.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set_downlink(&self, downlink_mbps: f64) {
        self.set(Some(ConnectivityReading {
            downlink_mbps,
            round_trip_ms: 50.0,
            effective_type: EffectiveType::G4,
        }));
    }

    pub fn set(&self, reading: Option<ConnectivityReading>) {
        *self.reading.lock() = reading;
    }
}

impl ConnectivityProbe for ScriptedProbe {
    fn current_sample(&self) -> Option<ConnectivityReading> {
        *self.reading.lock()
    }
}
