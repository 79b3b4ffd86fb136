#![forbid(unsafe_code)]

use lumen_abr::{DecisionReason, NetworkClass, QualityLevel};
use lumen_core::{MediaId, SessionId};
use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating at zero for clocks before it.
pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// A switch whose rendition could not be resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedSwitchEntry {
    pub from_level: QualityLevel,
    pub to_level: QualityLevel,
    pub reason: DecisionReason,
    pub error: String,
    /// Offset from session start.
    pub at_ms: u64,
}

/// Per-load performance record, written once when the session ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSessionRecord {
    pub session_id: SessionId,
    pub media_id: MediaId,
    pub started_at_ms: u64,
    /// `loadstart` to first `canplaythrough`; `None` if playback never got ready.
    pub load_time_ms: Option<u64>,
    pub buffer_event_count: u32,
    pub quality_switch_count: u32,
    pub initial_level: Option<QualityLevel>,
    pub final_level: Option<QualityLevel>,
    pub watch_duration_seconds: f64,
    pub completion_percentage: f64,
    pub network_quality_at_start: NetworkClass,
    pub cache_hit: bool,
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_switches: Vec<FailedSwitchEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BehaviorKind {
    Play,
    Pause,
    Seek,
    Fullscreen,
    Exit,
}

/// Device information captured with behavior events.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pixel_ratio: f32,
    pub connection: Option<NetworkClass>,
}

/// Where the player is embedded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub url: Option<String>,
    pub referrer: Option<String>,
}

/// One user interaction with the player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub session_id: SessionId,
    pub media_id: MediaId,
    pub kind: BehaviorKind,
    pub position_seconds: f64,
    pub device: DeviceSnapshot,
    pub page: PageContext,
    pub recorded_at_ms: u64,
}

/// Anything a [`MetricsSink`](crate::MetricsSink) accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsRecord {
    Session(PlaybackSessionRecord),
    Behavior(BehaviorEvent),
}

impl MetricsRecord {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Session(r) => r.session_id,
            Self::Behavior(e) => e.session_id,
        }
    }
}

impl From<PlaybackSessionRecord> for MetricsRecord {
    fn from(r: PlaybackSessionRecord) -> Self {
        Self::Session(r)
    }
}

impl From<BehaviorEvent> for MetricsRecord {
    fn from(e: BehaviorEvent) -> Self {
        Self::Behavior(e)
    }
}
