#![forbid(unsafe_code)]

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    error::{MetricsResult, MetricsWriteError},
    record::MetricsRecord,
};

/// Destination for session records and behavior events.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, record: MetricsRecord) -> MetricsResult<()>;
}

/// Sink that logs every record as JSON under the `lumen::metrics` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    async fn write(&self, record: MetricsRecord) -> MetricsResult<()> {
        let json = serde_json::to_string(&record)
            .map_err(|e| MetricsWriteError::Fatal(e.to_string()))?;
        tracing::info!(target: "lumen::metrics", session_id = %record.session_id(), record = %json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lumen_abr::NetworkClass;
    use lumen_core::MediaId;
    use web_time::Instant;

    use super::*;
    use crate::PerformanceTelemetrySession;

    #[tokio::test]
    async fn tracing_sink_accepts_session_records() {
        let mut session =
            PerformanceTelemetrySession::start(MediaId::new("m"), NetworkClass::Good, Instant::now());
        let record = session.finish().unwrap();
        assert!(TracingSink.write(record.into()).await.is_ok());
    }
}
