#![forbid(unsafe_code)]

use std::sync::Arc;

use lumen_core::{Epoch, MediaId, RetryPolicy, SessionId};
use tokio::{runtime::Handle, task::JoinHandle};
use web_time::SystemTime;

use crate::{
    flush::{FlushOutcome, write_with_retry},
    record::{BehaviorEvent, BehaviorKind, DeviceSnapshot, MetricsRecord, PageContext, unix_millis},
    sink::MetricsSink,
};

/// Fire-and-forget writer for user behavior events.
///
/// Writes run on spawned tasks; playback never waits for them. Retryable sink
/// failures get the same deferred retry as session records. Writes still
/// pending when their epoch is superseded are dropped.
#[derive(Clone)]
pub struct BehaviorRecorder {
    sink: Arc<dyn MetricsSink>,
    policy: RetryPolicy,
    device: DeviceSnapshot,
    page: PageContext,
}

impl BehaviorRecorder {
    pub fn new(
        sink: Arc<dyn MetricsSink>,
        policy: RetryPolicy,
        device: DeviceSnapshot,
        page: PageContext,
    ) -> Self {
        Self {
            sink,
            policy,
            device,
            page,
        }
    }

    pub fn event(
        &self,
        session_id: SessionId,
        media_id: MediaId,
        kind: BehaviorKind,
        position_seconds: f64,
    ) -> BehaviorEvent {
        BehaviorEvent {
            session_id,
            media_id,
            kind,
            position_seconds: if position_seconds.is_finite() {
                position_seconds.max(0.0)
            } else {
                0.0
            },
            device: self.device.clone(),
            page: self.page.clone(),
            recorded_at_ms: unix_millis(SystemTime::now()),
        }
    }

    /// Queue `event` for writing. Returns `None` outside a tokio runtime.
    pub fn record(&self, event: BehaviorEvent, epoch: &Epoch) -> Option<JoinHandle<FlushOutcome>> {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!(kind = ?event.kind, "no runtime, behavior event dropped");
            return None;
        };
        let sink = Arc::clone(&self.sink);
        let policy = self.policy.clone();
        let epoch = epoch.clone();
        Some(handle.spawn(async move {
            let kind = event.kind;
            if epoch.is_stale() {
                tracing::trace!(?kind, "behavior write dropped for a superseded generation");
                return FlushOutcome::Cancelled;
            }
            let record = MetricsRecord::Behavior(event);
            tokio::select! {
                biased;
                () = epoch.cancelled() => {
                    tracing::trace!(?kind, "behavior write cancelled");
                    FlushOutcome::Cancelled
                }
                outcome = write_with_retry(sink.as_ref(), &record, &policy, &epoch) => outcome,
            }
        }))
    }
}

impl std::fmt::Debug for BehaviorRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRecorder")
            .field("policy", &self.policy)
            .field("device", &self.device)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lumen_core::EpochCounter;
    use mockall::Sequence;
    use rstest::rstest;

    use super::*;
    use crate::{error::MetricsWriteError, sink::MockMetricsSink};

    fn recorder(sink: MockMetricsSink) -> BehaviorRecorder {
        BehaviorRecorder::new(
            Arc::new(sink),
            RetryPolicy::new(1, Duration::from_secs(2), Duration::from_secs(2)),
            DeviceSnapshot {
                user_agent: Some("test-agent".into()),
                viewport_width: 1280,
                viewport_height: 720,
                pixel_ratio: 2.0,
                connection: None,
            },
            PageContext::default(),
        )
    }

    #[tokio::test]
    async fn event_is_written_with_device_context() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .withf(|r| {
                matches!(r, MetricsRecord::Behavior(e)
                    if e.kind == BehaviorKind::Pause && e.device.viewport_width == 1280)
            })
            .times(1)
            .returning(|_| Ok(()));

        let recorder = recorder(sink);
        let epochs = EpochCounter::new();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Pause, 12.0);
        let outcome = recorder.record(event, &epochs.advance()).unwrap().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Written { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_gets_one_deferred_retry() {
        let mut sink = MockMetricsSink::new();
        let mut seq = Sequence::new();
        sink.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(MetricsWriteError::Retryable("busy".into())));
        sink.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let recorder = recorder(sink);
        let epochs = EpochCounter::new();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Play, 0.0);
        let outcome = recorder.record(event, &epochs.advance()).unwrap().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Written { attempts: 2 });
    }

    #[rstest]
    #[case::fatal(MetricsWriteError::Fatal("down".into()), 1)]
    #[case::retryable_twice(MetricsWriteError::Retryable("busy".into()), 2)]
    #[tokio::test(start_paused = true)]
    async fn failures_are_dropped_without_surfacing(
        #[case] error: MetricsWriteError,
        #[case] attempts: usize,
    ) {
        let mut sink = MockMetricsSink::new();
        let returned = error.clone();
        sink.expect_write()
            .times(attempts)
            .returning(move |_| Err(returned.clone()));

        let recorder = recorder(sink);
        let epochs = EpochCounter::new();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Play, 0.0);
        let outcome = recorder.record(event, &epochs.advance()).unwrap().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Dropped(error));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_retry_is_cancelled_by_new_generation() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .times(1)
            .returning(|_| Err(MetricsWriteError::Retryable("busy".into())));

        let recorder = recorder(sink);
        let epochs = EpochCounter::new();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Seek, 4.0);
        let task = recorder.record(event, &epochs.advance()).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        epochs.advance();
        assert_eq!(task.await.unwrap(), FlushOutcome::Cancelled);
    }

    #[tokio::test]
    async fn superseded_epoch_drops_the_write() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write().never();

        let recorder = recorder(sink);
        let epochs = EpochCounter::new();
        let epoch = epochs.advance();
        epochs.advance();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Exit, 3.0);
        let outcome = recorder.record(event, &epoch).unwrap().await.unwrap();
        assert_eq!(outcome, FlushOutcome::Cancelled);
    }

    #[test]
    fn outside_runtime_nothing_is_spawned() {
        let recorder = recorder(MockMetricsSink::new());
        let epochs = EpochCounter::new();
        let event = recorder.event(SessionId::generate(), MediaId::new("m"), BehaviorKind::Seek, -1.0);
        assert_eq!(event.position_seconds, 0.0);
        assert!(recorder.record(event, &epochs.advance()).is_none());
    }
}
