#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::Event;

/// Notification stream of one playback surface.
///
/// Carries quality decisions (including the terminal one after a fatal
/// playback error), committed and failed rendition switches, mode changes,
/// and session telemetry milestones. UI layers subscribe to it for transition
/// banners; the controller and the metrics flusher publish into it.
///
/// `publish()` is a sync call and never blocks the controller. Events without
/// subscribers are dropped; a UI that falls behind gets
/// `RecvError::Lagged(n)` and should resync from the controller getters.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish anything convertible into [`Event`], e.g. `bus.publish(QualityEvent::...)`.
    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use lumen_abr::{ControllerMode, QualityLevel};
    use lumen_core::SessionId;

    use super::*;
    use crate::{QualityEvent, TelemetryEvent};

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(QualityEvent::ModeChanged {
            mode: ControllerMode::Auto,
        });
    }

    #[tokio::test]
    async fn every_subscriber_receives() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        let session_id = SessionId::generate();
        bus.publish(TelemetryEvent::SessionFlushed { session_id });

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                Event::Telemetry(TelemetryEvent::SessionFlushed { session_id: id }) if id == session_id
            ));
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for level in QualityLevel::ALL {
            bus.publish(QualityEvent::ModeChanged {
                mode: ControllerMode::Manual(level),
            });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn clone_shares_channel() {
        let bus1 = EventBus::new(16);
        let bus2 = bus1.clone();
        let mut rx = bus1.subscribe();
        bus2.publish(QualityEvent::ModeChanged {
            mode: ControllerMode::Auto,
        });
        assert!(rx.try_recv().is_ok());
    }
}
