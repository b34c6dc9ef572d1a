use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::resolver::{
    METRIC_ACQUISITION, METRIC_ACQUISITION_JOINED, METRIC_ACQUISITION_MS, METRIC_CACHE_ERROR,
    METRIC_CACHE_MISS, METRIC_TIER_HIT,
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
            METRIC_TIER_HIT,
            Unit::Count,
            "Resolutions answered by a tier, labelled by `tier` (cache|store)."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Cache lookups that found no entry."
        );
        describe_counter!(
            METRIC_CACHE_ERROR,
            Unit::Count,
            "Absorbed cache failures, labelled by `op` (get|set|decode)."
        );
        describe_counter!(
            METRIC_ACQUISITION,
            Unit::Count,
            "Finished acquisitions, labelled by `outcome`."
        );
        describe_counter!(
            METRIC_ACQUISITION_JOINED,
            Unit::Count,
            "Resolutions that attached to an acquisition already in flight."
        );
        describe_histogram!(
            METRIC_ACQUISITION_MS,
            Unit::Milliseconds,
            "Acquisition latency in milliseconds."
        );
    });
}
