#![forbid(unsafe_code)]

use web_time::Instant;

use crate::BufferState;

/// Tracks buffer runway and stalls from ordered player events.
///
/// Stalls are cumulative for the session: recovering playback does not
/// forgive them. State is cleared only by [`BufferHealthMonitor::reset`] at a
/// session boundary.
#[derive(Clone, Debug, Default)]
pub struct BufferHealthMonitor {
    state: BufferState,
}

impl BufferHealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// `loadstart`: a new media load begins a new session.
    pub fn on_load_start(&mut self) {
        self.reset();
    }

    /// `waiting`: playback stalled on an empty buffer.
    pub fn on_waiting(&mut self, at: Instant) {
        self.state.stall_event_count = self.state.stall_event_count.saturating_add(1);
        self.state.last_stall_at = Some(at);
        tracing::debug!(
            stalls = self.state.stall_event_count,
            buffered = self.state.seconds_buffered,
            "buffer stall"
        );
    }

    /// `canplaythrough`: enough data to play on.
    pub fn on_can_play_through(&mut self) {
        self.state.primed = true;
    }

    /// The player source was swapped for another rendition. The new buffer
    /// starts empty, so runway checks wait for the next `canplaythrough`.
    /// Stalls are kept.
    pub fn on_source_swap(&mut self) {
        self.state.seconds_buffered = 0.0;
        self.state.primed = false;
    }

    /// `timeupdate`: recompute runway from the buffered range end.
    pub fn on_time_update(&mut self, buffered_end_secs: f64, position_secs: f64) {
        let ahead = buffered_end_secs - position_secs;
        self.state.seconds_buffered = if ahead.is_finite() { ahead.max(0.0) } else { 0.0 };
    }

    pub fn reset(&mut self) {
        self.state = BufferState::default();
    }
}
