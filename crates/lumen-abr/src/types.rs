#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use web_time::Instant;

/// Quality rendition a player can request, ordered from lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLevel {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "4k")]
    P2160,
}

impl QualityLevel {
    /// All levels, lowest first.
    pub const ALL: [Self; 6] = [
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P1080,
        Self::P1440,
        Self::P2160,
    ];

    pub const HIGHEST: Self = Self::P2160;

    /// Transform parameters of this rendition.
    pub const fn params(self) -> RenditionParams {
        let (target_height, encode_quality) = match self {
            Self::P360 => (360, 60),
            Self::P480 => (480, 70),
            Self::P720 => (720, 80),
            Self::P1080 => (1080, 85),
            Self::P1440 => (1440, 90),
            Self::P2160 => (2160, 95),
        };
        RenditionParams {
            target_height,
            encode_quality,
        }
    }

    /// Reverse lookup of [`QualityLevel::params`].
    pub fn from_params(params: RenditionParams) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.params() == params)
    }

    /// Next level down, or `None` at the bottom of the ladder.
    pub fn step_down(self) -> Option<Self> {
        let idx = self.index();
        idx.checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Next level up, or `None` at the top of the ladder.
    pub fn step_up(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "4k",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-level transform handed to the storage URL signer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenditionParams {
    /// Output height in pixels.
    pub target_height: u32,
    /// Encoder quality, 0–100.
    pub encode_quality: u8,
}

/// Browser-style effective connection type, ordered slowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    G2,
    #[serde(rename = "3g")]
    G3,
    #[serde(rename = "4g")]
    G4,
}

impl EffectiveType {
    /// Parse the label reported by the connectivity probe.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "slow-2g" => Some(Self::Slow2g),
            "2g" => Some(Self::G2),
            "3g" => Some(Self::G3),
            "4g" | "5g" => Some(Self::G4),
            _ => None,
        }
    }
}

/// Coarse network quality class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
    Offline,
    Poor,
    Fair,
    Good,
    Excellent,
    /// The platform cannot report connectivity.
    Unknown,
}

impl NetworkClass {
    /// Class used for decisions: `Unknown` is treated as `Fair`, never better.
    pub fn effective(self) -> Self {
        match self {
            Self::Unknown => Self::Fair,
            other => other,
        }
    }

    /// Highest level this class can sustain.
    pub fn max_sustainable_level(self) -> QualityLevel {
        match self.effective() {
            Self::Excellent => QualityLevel::P2160,
            Self::Good => QualityLevel::P1080,
            Self::Fair | Self::Unknown => QualityLevel::P480,
            Self::Poor | Self::Offline => QualityLevel::P360,
        }
    }
}

impl fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Raw reading from a connectivity probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConnectivityReading {
    pub downlink_mbps: f64,
    pub round_trip_ms: f64,
    pub effective_type: EffectiveType,
}

/// Classified connectivity snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkSample {
    pub class: NetworkClass,
    pub downlink_mbps: f64,
    pub round_trip_ms: f64,
    pub sampled_at: Instant,
}

impl NetworkSample {
    /// Sample for platforms without connectivity information.
    pub fn unknown(at: Instant) -> Self {
        Self {
            class: NetworkClass::Unknown,
            downlink_mbps: 0.0,
            round_trip_ms: 0.0,
            sampled_at: at,
        }
    }
}

/// Playback buffer runway and stall history of the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BufferState {
    pub seconds_buffered: f64,
    pub stall_event_count: u32,
    pub last_stall_at: Option<Instant>,
    /// Set once the player first reported `canplaythrough`.
    pub primed: bool,
}

/// Why a decision was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    Manual,
    UpgradeStable,
    DowngradeStall,
    DowngradeNetwork,
    Initial,
}

/// Output of one engine step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityDecision {
    pub from_level: QualityLevel,
    pub to_level: QualityLevel,
    pub should_switch: bool,
    pub reason: DecisionReason,
    pub decided_at: Instant,
}

impl QualityDecision {
    pub(crate) fn switch(
        from_level: QualityLevel,
        to_level: QualityLevel,
        reason: DecisionReason,
        at: Instant,
    ) -> Self {
        Self {
            from_level,
            to_level,
            should_switch: from_level != to_level,
            reason,
            decided_at: at,
        }
    }

    pub(crate) fn hold(level: QualityLevel, reason: DecisionReason, at: Instant) -> Self {
        Self {
            from_level: level,
            to_level: level,
            should_switch: false,
            reason,
            decided_at: at,
        }
    }

    /// Same transition, ignoring when it was decided.
    pub fn same_transition(&self, other: &Self) -> bool {
        self.from_level == other.from_level
            && self.to_level == other.to_level
            && self.should_switch == other.should_switch
            && self.reason == other.reason
    }
}

/// Who is choosing the quality level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ControllerMode {
    #[default]
    Auto,
    Manual(QualityLevel),
}

impl ControllerMode {
    pub fn is_auto(self) -> bool {
        matches!(self, Self::Auto)
    }
}
