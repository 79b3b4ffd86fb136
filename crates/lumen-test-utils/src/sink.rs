#![forbid(unsafe_code)]

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use lumen_telemetry::{
    BehaviorEvent, MetricsRecord, MetricsResult, MetricsSink, MetricsWriteError,
    PlaybackSessionRecord,
};
use parking_lot::Mutex;

/// Sink that keeps every accepted record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricsRecord>>,
    failures: Mutex<VecDeque<MetricsWriteError>>,
    attempts: Mutex<usize>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write take `delay` before it is accepted.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next write with `error`.
    pub fn fail_next(&self, error: MetricsWriteError) {
        self.failures.lock().push_back(error);
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn sessions(&self) -> Vec<PlaybackSessionRecord> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                MetricsRecord::Session(s) => Some(s.clone()),
                MetricsRecord::Behavior(_) => None,
            })
            .collect()
    }

    pub fn behaviors(&self) -> Vec<BehaviorEvent> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                MetricsRecord::Behavior(b) => Some(b.clone()),
                MetricsRecord::Session(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn write(&self, record: MetricsRecord) -> MetricsResult<()> {
        *self.attempts.lock() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        self.records.lock().push(record);
        Ok(())
    }
}
