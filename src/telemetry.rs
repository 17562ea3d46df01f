use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

static METRIC_DESCRIPTIONS: Once = Once::new();

#[derive(Debug, Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays clean.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| TelemetryError(err.to_string()))
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "curator_cache_hit_total",
            Unit::Count,
            "Reads answered from a fresh cache entry."
        );
        describe_counter!(
            "curator_cache_miss_total",
            Unit::Count,
            "Reads that had to fetch from the backend."
        );
        describe_counter!(
            "curator_cache_invalidated_total",
            Unit::Count,
            "Cache entries marked stale by invalidation."
        );
        describe_histogram!(
            "curator_fetch_ms",
            Unit::Milliseconds,
            "Backend fetch latency per cache key, retries included."
        );
        describe_counter!(
            "curator_mutation_rollback_total",
            Unit::Count,
            "Speculative cache writes restored after a failed mutation."
        );
        describe_histogram!(
            "curator_mutation_ms",
            Unit::Milliseconds,
            "End-to-end mutation latency from snapshot to invalidation."
        );
        describe_counter!(
            "curator_poll_total",
            Unit::Count,
            "Polling iterations by outcome."
        );
    });
}
