#![forbid(unsafe_code)]

use std::time::Duration;

use derive_setters::Setters;
use lumen_abr::AbrOptions;
use lumen_core::RetryPolicy;
use lumen_events::EventBus;
use lumen_rendition::UrlCache;
use lumen_telemetry::{DeviceSnapshot, PageContext};

/// Configuration of one playback surface.
///
/// ```
/// use lumen_abr::{AbrOptions, QualityLevel};
/// use lumen_play::PlaybackConfig;
///
/// let config = PlaybackConfig::default()
///     .with_abr(AbrOptions::default().with_max_level(QualityLevel::P1080))
///     .with_warm_neighbors(false);
/// assert_eq!(config.abr.max_level, QualityLevel::P1080);
/// ```
#[derive(Clone, Debug, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct PlaybackConfig {
    pub abr: AbrOptions,
    /// Event bus to publish on. When `None`, a fresh bus is created.
    #[setters(rename = "with_events")]
    pub bus: Option<EventBus>,
    pub bus_capacity: usize,
    /// Shared URL cache. When `None`, the surface gets its own.
    pub url_cache: Option<UrlCache>,
    /// Signed URLs this close to expiry count as expired.
    pub cache_expiry_margin: Duration,
    pub resolve_retry: RetryPolicy,
    pub flush_retry: RetryPolicy,
    /// Pre-resolve the levels around the current one after each switch.
    pub warm_neighbors: bool,
    pub device: DeviceSnapshot,
    pub page: PageContext,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            abr: AbrOptions::default(),
            bus: None,
            bus_capacity: 64,
            url_cache: None,
            cache_expiry_margin: Duration::from_secs(5),
            resolve_retry: RetryPolicy::default(),
            flush_retry: RetryPolicy::default(),
            warm_neighbors: true,
            device: DeviceSnapshot::default(),
            page: PageContext::default(),
        }
    }
}

impl PlaybackConfig {
    pub(crate) fn event_bus(&self) -> EventBus {
        self.bus
            .clone()
            .unwrap_or_else(|| EventBus::new(self.bus_capacity))
    }

    pub(crate) fn url_cache(&self) -> UrlCache {
        self.url_cache
            .clone()
            .unwrap_or_else(|| UrlCache::new(self.cache_expiry_margin))
    }
}
