#![forbid(unsafe_code)]

use lumen_core::{MediaId, SessionId};

/// Telemetry lifecycle events.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryEvent {
    SessionStarted {
        session_id: SessionId,
        media_id: MediaId,
    },
    /// The session record reached the metrics sink.
    SessionFlushed { session_id: SessionId },
    /// The session record was dropped after a fatal or repeated sink error.
    FlushFailed {
        session_id: SessionId,
        error: String,
    },
}
