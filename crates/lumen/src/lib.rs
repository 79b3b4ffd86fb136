//! Adaptive video quality for web playback.
//!
//! `lumen` picks which rendition of a video to request as network and buffer
//! conditions change, and records how every playback session went.
//!
//! ## Crates
//!
//! - [`shared`]: identifiers, generation tokens and retry policy
//! - [`abr`]: network classification, buffer health and the decision engine
//! - [`rendition`]: rendition parameters, signed-URL resolution and caching
//! - [`telemetry`]: session records, behavior events and metrics delivery
//! - [`events`]: broadcast bus for UI and telemetry notifications
//! - [`play`]: the controller that ties player events to all of the above
//!
//! Most applications only need the [`prelude`].

#![forbid(unsafe_code)]

pub use lumen_abr as abr;
pub use lumen_core as shared;
pub use lumen_events as events;
pub use lumen_play as play;
pub use lumen_rendition as rendition;
pub use lumen_telemetry as telemetry;

pub mod prelude {
    pub use lumen_abr::{
        AbrOptions, ControllerMode, DecisionReason, NetworkClass, QualityDecision, QualityLevel,
    };
    pub use lumen_core::{MediaId, RetryPolicy, SourceRef};
    pub use lumen_events::{Event, EventBus, QualityEvent, TelemetryEvent};
    pub use lumen_play::{
        ConnectivityProbe, DriverReport, MediaClock, MediaEvent, PlayError, PlaybackConfig,
        PlaybackDriver, SwitchResult,
    };
    pub use lumen_rendition::{ResolutionError, SignedUrl, StorageUrlResolver, UrlCache};
    pub use lumen_telemetry::{MetricsSink, MetricsWriteError, TracingSink};
}
