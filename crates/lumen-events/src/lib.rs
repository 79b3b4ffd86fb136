#![forbid(unsafe_code)]

//! Event bus connecting the quality controller to the UI and telemetry.

mod bus;
mod event;
mod quality;
mod telemetry;

pub use bus::EventBus;
pub use event::Event;
pub use quality::QualityEvent;
pub use telemetry::TelemetryEvent;
