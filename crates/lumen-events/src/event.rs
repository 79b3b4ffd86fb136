#![forbid(unsafe_code)]

use crate::{QualityEvent, TelemetryEvent};

/// Unified event for the playback controller.
#[derive(Clone, Debug)]
pub enum Event {
    Quality(QualityEvent),
    Telemetry(TelemetryEvent),
}

impl From<QualityEvent> for Event {
    fn from(e: QualityEvent) -> Self {
        Self::Quality(e)
    }
}

impl From<TelemetryEvent> for Event {
    fn from(e: TelemetryEvent) -> Self {
        Self::Telemetry(e)
    }
}

#[cfg(test)]
mod tests {
    use lumen_abr::{ControllerMode, QualityLevel};
    use lumen_core::{MediaId, SessionId};

    use super::*;

    #[test]
    fn quality_event_into_event() {
        let event: Event = QualityEvent::ModeChanged {
            mode: ControllerMode::Manual(QualityLevel::P720),
        }
        .into();
        assert!(matches!(
            event,
            Event::Quality(QualityEvent::ModeChanged {
                mode: ControllerMode::Manual(QualityLevel::P720)
            })
        ));
    }

    #[test]
    fn telemetry_event_into_event() {
        let session_id = SessionId::generate();
        let event: Event = TelemetryEvent::SessionStarted {
            session_id,
            media_id: MediaId::new("m1"),
        }
        .into();
        assert!(matches!(
            event,
            Event::Telemetry(TelemetryEvent::SessionStarted { session_id: id, .. }) if id == session_id
        ));
    }
}
