#![forbid(unsafe_code)]

use lumen_core::EpochCounter;
use rstest::fixture;

#[fixture]
pub fn tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn debug_tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            "lumen_abr=debug,lumen_rendition=debug,lumen_telemetry=debug,lumen_play=debug",
        ))
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn epochs() -> EpochCounter {
    EpochCounter::new()
}
