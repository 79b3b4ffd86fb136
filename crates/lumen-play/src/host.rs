#![forbid(unsafe_code)]

use lumen_abr::ConnectivityReading;
#[cfg(test)]
use mockall::automock;
use web_time::Instant;

/// Read-only view of the media element's timeline, in seconds.
pub trait MediaClock: Send + Sync {
    /// End of the buffered range that contains the playhead.
    fn buffered_end(&self) -> f64;

    fn current_position(&self) -> f64;

    /// Media duration once metadata is known.
    fn duration(&self) -> Option<f64>;

    fn buffered_seconds_ahead(&self) -> f64 {
        let ahead = self.buffered_end() - self.current_position();
        if ahead.is_finite() { ahead.max(0.0) } else { 0.0 }
    }

    /// Time used to stamp decisions and session milestones. Simulated hosts
    /// override it to drive playback faster than wall-clock.
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Platform connectivity information.
#[cfg_attr(test, automock)]
pub trait ConnectivityProbe: Send + Sync {
    /// `None` when the platform exposes no connectivity API.
    fn current_sample(&self) -> Option<ConnectivityReading>;
}

/// Probe for platforms without connectivity information.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoConnectivity;

impl ConnectivityProbe for NoConnectivity {
    fn current_sample(&self) -> Option<ConnectivityReading> {
        None
    }
}

/// Media element event, in the order the player emits them.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    LoadStart,
    LoadedMetadata,
    Waiting,
    CanPlayThrough,
    TimeUpdate,
    Ended,
    Error { message: String, fatal: bool },
    Play,
    Pause,
    Seeked,
    Fullscreen,
}

impl MediaEvent {
    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
        }
    }
}
