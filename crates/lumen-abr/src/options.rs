#![forbid(unsafe_code)]

use std::time::Duration;

use derive_setters::Setters;

use crate::QualityLevel;

/// Downlink thresholds (Mbps) used by the network classifier.
#[derive(Clone, Debug, PartialEq, Setters)]
#[setters(prefix = "with_")]
pub struct ClassifierOptions {
    /// Downlink above which a 4g connection is `Excellent`.
    pub excellent_mbps: f64,
    /// Downlink above which a 4g connection is `Good`.
    pub good_mbps: f64,
    /// Downlink above which a 3g-or-better connection is `Fair`.
    pub fair_mbps: f64,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            excellent_mbps: 10.0,
            good_mbps: 5.0,
            fair_mbps: 1.0,
        }
    }
}

/// Quality-decision engine configuration.
///
/// Thresholds are tunable defaults.
#[derive(Clone, Debug, PartialEq, Setters)]
#[setters(prefix = "with_")]
pub struct AbrOptions {
    /// Buffer level below which the engine downgrades immediately.
    pub low_buffer_secs: f64,
    /// Buffer level required before an upgrade.
    pub min_buffer_for_upgrade_secs: f64,
    /// Time without switch or stall required before an upgrade.
    pub stability_window: Duration,
    /// Consecutive evaluations a lower recommendation must hold before a network downgrade.
    pub network_downgrade_confirmations: u32,
    /// Highest level the source offers.
    pub max_level: QualityLevel,
    /// Decision history ring capacity, clamped to [`MAX_HISTORY`](crate::MAX_HISTORY).
    pub history_capacity: usize,
    pub classifier: ClassifierOptions,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            low_buffer_secs: 2.0,
            min_buffer_for_upgrade_secs: 8.0,
            stability_window: Duration::from_secs(10),
            network_downgrade_confirmations: 1,
            max_level: QualityLevel::HIGHEST,
            history_capacity: 10,
            classifier: ClassifierOptions::default(),
        }
    }
}
