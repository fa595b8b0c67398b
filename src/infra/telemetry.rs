use std::io;
use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr; query commands print their JSON results on stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "bizdash_cache_memory_hit_total",
            Unit::Count,
            "Total number of memory-tier cache hits."
        );
        describe_counter!(
            "bizdash_cache_memory_miss_total",
            Unit::Count,
            "Total number of memory-tier cache misses."
        );
        describe_counter!(
            "bizdash_cache_memory_evict_total",
            Unit::Count,
            "Total number of memory-tier evictions due to capacity."
        );
        describe_counter!(
            "bizdash_cache_persistent_hit_total",
            Unit::Count,
            "Total number of persistent-tier cache hits."
        );
        describe_counter!(
            "bizdash_cache_persistent_miss_total",
            Unit::Count,
            "Total number of persistent-tier cache misses."
        );
        describe_counter!(
            "bizdash_cache_persistent_write_error_total",
            Unit::Count,
            "Total number of failed persistent-tier writes."
        );
        describe_counter!(
            "bizdash_cache_invalidated_total",
            Unit::Count,
            "Total number of entries removed by invalidation across both tiers."
        );
        describe_gauge!(
            "bizdash_cache_bus_queue_len",
            Unit::Count,
            "Current number of pending events on the invalidation bus."
        );
        describe_counter!(
            "bizdash_cache_bus_dropped_total",
            Unit::Count,
            "Total number of invalidation events dropped due to bus overflow."
        );
        describe_histogram!(
            "bizdash_cache_consume_ms",
            Unit::Milliseconds,
            "Invalidation consumption latency in milliseconds."
        );
        describe_histogram!(
            "bizdash_dashboard_fetch_ms",
            Unit::Milliseconds,
            "Dashboard query latency on cache miss in milliseconds."
        );
    });
}
