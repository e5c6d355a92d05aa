//! Logging and metrics setup

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level; `verbose` forces debug.
pub fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // A subscriber may already be set (tests, embedding); keep the first one.
    let _ = if config.format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(false).try_init()
    };
}

/// Install the Prometheus recorder and describe every metric the bridge emits
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("failed to install metrics recorder: {e}")))?;

    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    describe_counter!(
        "oneview_alerts_processed_total",
        "Alerts claimed and delivered (or skipped) by this instance"
    );
    describe_counter!("pagerduty_alerts_sent_total", "Events accepted by PagerDuty");
    describe_counter!(
        "pagerduty_alerts_failed_total",
        "Events that could not be delivered, by reason"
    );
    describe_counter!(
        "pagerduty_delivery_attempts_total",
        "Delivery requests sent to PagerDuty"
    );
    describe_histogram!(
        "oneview_auth_duration_seconds",
        Unit::Seconds,
        "Time spent logging in to OneView"
    );
    describe_histogram!(
        "oneview_api_latency_seconds",
        Unit::Seconds,
        "OneView API request latency by endpoint"
    );
    describe_histogram!(
        "alert_delivery_duration_seconds",
        Unit::Seconds,
        "PagerDuty delivery latency"
    );
    describe_gauge!("oneview_session_active", "1 while a OneView session is held");
    describe_gauge!("processed_alerts_count", "Identities held in the dedup cache");
}
