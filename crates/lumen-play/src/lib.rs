//! Playback-side glue for adaptive quality.
//!
//! [`PlaybackController`] receives media element events and connectivity
//! changes, feeds the quality engine and the telemetry session, and returns
//! the asynchronous work as [`ControllerAction`]s. [`PlaybackDriver`] runs
//! that work (rendition preloads, metrics flushes, behavior writes) without
//! holding the controller lock across I/O.

#![forbid(unsafe_code)]

mod config;
mod controller;
mod driver;
mod error;
mod host;

pub use config::PlaybackConfig;
pub use controller::{
    BehaviorAction, ControllerAction, LoadPlan, PlaybackController, SwitchResult,
};
pub use driver::{DriverReport, PendingFlush, PlaybackDriver};
pub use error::{PlayError, PlayResult};
pub use host::{ConnectivityProbe, MediaClock, MediaEvent, NoConnectivity};
