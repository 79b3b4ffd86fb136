//! Playback performance telemetry.
//!
//! A [`PerformanceTelemetrySession`] accumulates metrics for one media load and
//! yields a [`PlaybackSessionRecord`] exactly once. [`TelemetryFlusher`] writes
//! it to a [`MetricsSink`]; [`BehaviorRecorder`] sends user interactions
//! without blocking playback.

#![forbid(unsafe_code)]

mod behavior;
mod error;
mod flush;
mod record;
mod session;
mod sink;

pub use behavior::BehaviorRecorder;
pub use error::{MetricsResult, MetricsWriteError};
pub use flush::{FlushOutcome, FlushTicket, TelemetryFlusher};
pub use record::{
    BehaviorEvent, BehaviorKind, DeviceSnapshot, FailedSwitchEntry, MetricsRecord, PageContext,
    PlaybackSessionRecord, unix_millis,
};
pub use session::PerformanceTelemetrySession;
pub use sink::{MetricsSink, TracingSink};
