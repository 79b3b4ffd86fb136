#![forbid(unsafe_code)]

use std::sync::Arc;

use lumen_core::{Epoch, RetryPolicy, SessionId};
use lumen_events::{EventBus, TelemetryEvent};

use crate::{
    error::MetricsWriteError,
    record::{MetricsRecord, PlaybackSessionRecord},
    sink::MetricsSink,
};

/// A finished session record waiting to be written.
#[derive(Clone, Debug)]
pub struct FlushTicket {
    pub record: PlaybackSessionRecord,
    /// Generation the session belonged to; superseding it cancels retries.
    pub epoch: Epoch,
}

impl FlushTicket {
    pub fn session_id(&self) -> SessionId {
        self.record.session_id
    }
}

/// Result of writing one metrics record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    Written { attempts: u32 },
    Dropped(MetricsWriteError),
    /// The generation was superseded before the record was accepted.
    Cancelled,
}

/// Write `record`, giving retryable failures up to `policy.max_retries`
/// deferred retries while `epoch` stays current. The first attempt is always
/// made.
pub(crate) async fn write_with_retry(
    sink: &dyn MetricsSink,
    record: &MetricsRecord,
    policy: &RetryPolicy,
    epoch: &Epoch,
) -> FlushOutcome {
    let session_id = record.session_id();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match sink.write(record.clone()).await {
            Ok(()) => return FlushOutcome::Written { attempts: attempt },
            Err(e) => e,
        };

        let retry = attempt;
        if !error.is_retryable() || retry > policy.max_retries {
            tracing::warn!(%session_id, %error, attempts = attempt, "dropping metrics record");
            return FlushOutcome::Dropped(error);
        }
        if epoch.is_stale() {
            tracing::trace!(%session_id, "metrics retry cancelled by newer generation");
            return FlushOutcome::Cancelled;
        }

        tracing::debug!(%session_id, %error, retry, "deferring metrics retry");
        tokio::select! {
            biased;
            () = epoch.cancelled() => {
                tracing::trace!(%session_id, "metrics retry cancelled by newer generation");
                return FlushOutcome::Cancelled;
            }
            () = tokio::time::sleep(policy.delay_for_retry(retry)) => {}
        }
    }
}

/// Writes session records to a [`MetricsSink`].
///
/// The first attempt is always made. Retryable failures get up to
/// `policy.max_retries` deferred retries, abandoned when the ticket's epoch is
/// superseded.
#[derive(Clone)]
pub struct TelemetryFlusher {
    sink: Arc<dyn MetricsSink>,
    policy: RetryPolicy,
    bus: Option<EventBus>,
}

impl TelemetryFlusher {
    pub fn new(sink: Arc<dyn MetricsSink>, policy: RetryPolicy) -> Self {
        Self {
            sink,
            policy,
            bus: None,
        }
    }

    /// Publish flush results as [`TelemetryEvent`]s.
    #[must_use]
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub async fn flush(&self, ticket: FlushTicket) -> FlushOutcome {
        let session_id = ticket.session_id();
        let record = MetricsRecord::Session(ticket.record);
        let outcome =
            write_with_retry(self.sink.as_ref(), &record, &self.policy, &ticket.epoch).await;

        if let Some(bus) = &self.bus {
            match &outcome {
                FlushOutcome::Written { .. } => bus.publish(TelemetryEvent::SessionFlushed { session_id }),
                FlushOutcome::Dropped(error) => bus.publish(TelemetryEvent::FlushFailed {
                    session_id,
                    error: error.to_string(),
                }),
                FlushOutcome::Cancelled => bus.publish(TelemetryEvent::FlushFailed {
                    session_id,
                    error: "cancelled".to_owned(),
                }),
            }
        }
        outcome
    }
}

impl std::fmt::Debug for TelemetryFlusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryFlusher")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lumen_abr::NetworkClass;
    use lumen_core::{EpochCounter, MediaId};
    use mockall::Sequence;
    use web_time::Instant;

    use super::*;
    use crate::{PerformanceTelemetrySession, sink::MockMetricsSink};

    fn ticket(epoch: Epoch) -> FlushTicket {
        let mut session =
            PerformanceTelemetrySession::start(MediaId::new("m"), NetworkClass::Fair, Instant::now());
        FlushTicket {
            record: session.finish().unwrap(),
            epoch,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(1, Duration::from_secs(2), Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_is_retried_once() {
        let mut sink = MockMetricsSink::new();
        let mut seq = Sequence::new();
        sink.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(MetricsWriteError::Retryable("503".into())));
        sink.expect_write()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let epochs = EpochCounter::new();
        let flusher = TelemetryFlusher::new(Arc::new(sink), policy());
        let outcome = flusher.flush(ticket(epochs.advance())).await;
        assert_eq!(outcome, FlushOutcome::Written { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn second_retryable_failure_drops() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .times(2)
            .returning(|_| Err(MetricsWriteError::Retryable("503".into())));

        let epochs = EpochCounter::new();
        let flusher = TelemetryFlusher::new(Arc::new(sink), policy());
        let outcome = flusher.flush(ticket(epochs.advance())).await;
        assert!(matches!(outcome, FlushOutcome::Dropped(MetricsWriteError::Retryable(_))));
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .times(1)
            .returning(|_| Err(MetricsWriteError::Fatal("schema".into())));

        let epochs = EpochCounter::new();
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let flusher = TelemetryFlusher::new(Arc::new(sink), policy()).with_bus(bus);
        let t = ticket(epochs.advance());
        let session_id = t.session_id();

        assert!(matches!(flusher.flush(t).await, FlushOutcome::Dropped(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            lumen_events::Event::Telemetry(TelemetryEvent::FlushFailed { session_id: id, .. }) if id == session_id
        ));
    }

    #[tokio::test]
    async fn stale_generation_still_gets_first_attempt() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .times(1)
            .returning(|_| Err(MetricsWriteError::Retryable("503".into())));

        let epochs = EpochCounter::new();
        let epoch = epochs.advance();
        epochs.advance();

        let flusher = TelemetryFlusher::new(Arc::new(sink), policy());
        assert_eq!(flusher.flush(ticket(epoch)).await, FlushOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_retry_is_cancelled_by_new_generation() {
        let mut sink = MockMetricsSink::new();
        sink.expect_write()
            .times(1)
            .returning(|_| Err(MetricsWriteError::Retryable("503".into())));

        let epochs = EpochCounter::new();
        let flusher = TelemetryFlusher::new(Arc::new(sink), policy());
        let task = tokio::spawn({
            let t = ticket(epochs.advance());
            async move { flusher.flush(t).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        epochs.advance();
        assert_eq!(task.await.unwrap(), FlushOutcome::Cancelled);
    }
}
