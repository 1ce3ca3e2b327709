use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CONFIRMATION_ISSUED, METRIC_IMPORT_MS, METRIC_STORE_HIT, METRIC_STORE_INVALIDATED,
    METRIC_STORE_MISS,
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
            METRIC_STORE_HIT,
            Unit::Count,
            "Total number of cache reads that found a live entry."
        );
        describe_counter!(
            METRIC_STORE_MISS,
            Unit::Count,
            "Total number of cache reads that found no live entry."
        );
        describe_counter!(
            METRIC_STORE_INVALIDATED,
            Unit::Count,
            "Total number of entries removed by invalidation, cascades included."
        );
        describe_counter!(
            METRIC_CONFIRMATION_ISSUED,
            Unit::Count,
            "Total number of confirmation tokens issued for destructive actions."
        );
        describe_histogram!(
            METRIC_IMPORT_MS,
            Unit::Milliseconds,
            "Cache import batch latency in milliseconds."
        );
    });
}
