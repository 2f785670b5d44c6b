use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::listing::{
    METRIC_LIST_CACHE_HIT_TOTAL, METRIC_LIST_CACHE_MISS_TOTAL, METRIC_LIST_QUERY_MS,
};
use crate::cache::METRIC_CACHE_EVICT_TOTAL;
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
            METRIC_LIST_CACHE_HIT_TOTAL,
            Unit::Count,
            "Listing requests answered from the cached page."
        );
        describe_counter!(
            METRIC_LIST_CACHE_MISS_TOTAL,
            Unit::Count,
            "Listing requests that queried the collection."
        );
        describe_counter!(
            METRIC_CACHE_EVICT_TOTAL,
            Unit::Count,
            "Cache entries evicted due to capacity."
        );
        describe_histogram!(
            METRIC_LIST_QUERY_MS,
            Unit::Milliseconds,
            "Listing latency in milliseconds, labelled by cache outcome."
        );
    });
}
