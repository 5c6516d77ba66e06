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
/// Metric descriptions are registered once per process.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // stdout belongs to the terminal driver's output
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
            .with_target(false)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "caseflow_store_hit_total",
            Unit::Count,
            "Resource store reads served from cache, by kind (entity or collection)."
        );
        describe_counter!(
            "caseflow_store_miss_total",
            Unit::Count,
            "Resource store reads that found nothing, by kind."
        );
        describe_counter!(
            "caseflow_store_evict_total",
            Unit::Count,
            "Resource store evictions due to capacity, by kind."
        );
        describe_counter!(
            "caseflow_query_fetch_started_total",
            Unit::Count,
            "Query fetches started."
        );
        describe_counter!(
            "caseflow_query_fetch_deduped_total",
            Unit::Count,
            "Fetch requests that joined an in-flight fetch instead of starting one."
        );
        describe_counter!(
            "caseflow_query_fetch_cancelled_total",
            Unit::Count,
            "In-flight fetches whose result was suppressed."
        );
        describe_counter!(
            "caseflow_query_fetch_failed_total",
            Unit::Count,
            "Query fetches that settled with an error, by error kind."
        );
        describe_counter!(
            "caseflow_query_fetch_retry_total",
            Unit::Count,
            "Fetch retries after a transient failure."
        );
        describe_counter!(
            "caseflow_query_evict_total",
            Unit::Count,
            "Query entries evicted due to capacity."
        );
        describe_counter!(
            "caseflow_mutation_committed_total",
            Unit::Count,
            "Optimistic mutations committed with the server value."
        );
        describe_counter!(
            "caseflow_mutation_rolled_back_total",
            Unit::Count,
            "Optimistic mutations rolled back, by error kind."
        );
        describe_counter!(
            "caseflow_mutation_queued_total",
            Unit::Count,
            "Mutations queued behind a pending mutation of the same key."
        );
        describe_histogram!(
            "caseflow_mutation_latency_ms",
            Unit::Milliseconds,
            "Mutation latency from submission to settle, by outcome."
        );
        describe_gauge!(
            "caseflow_cache_event_queue_length",
            Unit::Count,
            "Current number of pending cache events in the queue."
        );
        describe_histogram!(
            "caseflow_cache_consume_ms",
            Unit::Milliseconds,
            "Invalidation consumption latency in milliseconds."
        );
    });
}
