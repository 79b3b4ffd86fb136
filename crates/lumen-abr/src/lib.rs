//! Adaptive quality selection for video playback.
//!
//! The crate turns noisy playback signals into stable rendition decisions:
//!
//! - [`NetworkQualityClassifier`] maps connectivity readings to a [`NetworkClass`].
//! - [`BufferHealthMonitor`] tracks buffer runway and cumulative stalls.
//! - [`QualityDecisionEngine`] applies hysteresis and emits [`QualityDecision`]s.
//!
//! ## Example
//!
//! ```rust
//! use lumen_abr::{
//!     BufferHealthMonitor, EffectiveType, NetworkQualityClassifier, QualityDecisionEngine,
//!     QualityLevel,
//! };
//! use web_time::Instant;
//!
//! let classifier = NetworkQualityClassifier::default();
//! let monitor = BufferHealthMonitor::new();
//! let mut engine = QualityDecisionEngine::default();
//!
//! let now = Instant::now();
//! let sample = classifier.classify(3.0, 80.0, EffectiveType::G4, now);
//! let initial = engine.start(&sample, &monitor.state(), now);
//! assert_eq!(initial.to_level, QualityLevel::P480);
//! ```

#![forbid(unsafe_code)]

mod buffer;
mod classifier;
mod engine;
mod options;
mod types;

pub use buffer::BufferHealthMonitor;
pub use classifier::NetworkQualityClassifier;
pub use engine::{MAX_HISTORY, QualityDecisionEngine};
pub use options::{AbrOptions, ClassifierOptions};
pub use types::{
    BufferState, ConnectivityReading, ControllerMode, DecisionReason, EffectiveType,
    NetworkClass, NetworkSample, QualityDecision, QualityLevel, RenditionParams,
};
