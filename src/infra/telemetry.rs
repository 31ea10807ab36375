use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "fpcache_hit_total",
            Unit::Count,
            "Total number of requests answered from the page cache."
        );
        describe_counter!(
            "fpcache_miss_total",
            Unit::Count,
            "Total number of eligible requests that had to be rendered."
        );
        describe_counter!(
            "fpcache_store_total",
            Unit::Count,
            "Total number of rendered pages written to the page cache."
        );
        describe_counter!(
            "fpcache_store_failed_total",
            Unit::Count,
            "Total number of backend operations that failed and were swallowed."
        );
        describe_counter!(
            "fpcache_minify_failed_total",
            Unit::Count,
            "Total number of pages stored unminified after a minifier error."
        );
        describe_counter!(
            "fpcache_clear_total",
            Unit::Count,
            "Total number of full page cache clears, labelled by reason."
        );
        describe_histogram!(
            "fpcache_capture_bytes",
            Unit::Bytes,
            "Size of captured pages after minification and annotation."
        );
    });
}
