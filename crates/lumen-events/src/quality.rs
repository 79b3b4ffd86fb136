#![forbid(unsafe_code)]

use lumen_abr::{ControllerMode, QualityDecision, QualityLevel};
use lumen_core::MediaId;

/// Notifications the UI layer subscribes to (transition banners, quality menu).
#[derive(Clone, Debug)]
pub enum QualityEvent {
    /// The engine produced a new decision.
    ///
    /// `terminal` carries the playback error that ended the session; no further
    /// decisions follow a terminal notification.
    DecisionChanged {
        decision: QualityDecision,
        terminal: Option<String>,
    },
    /// A switch resolved and the player source was swapped.
    SwitchCommitted {
        from: QualityLevel,
        to: QualityLevel,
        decision: QualityDecision,
    },
    /// A switch could not resolve its rendition; the current level stays.
    SwitchFailed {
        decision: QualityDecision,
        error: String,
    },
    /// Auto/Manual mode changed.
    ModeChanged { mode: ControllerMode },
    /// A new media item started loading.
    MediaLoaded {
        media_id: MediaId,
        level: QualityLevel,
    },
}
