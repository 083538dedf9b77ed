//! Negotiation metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder the
//! calls are no-ops.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe every metric
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!(
        "palaver_candidates_dropped_total",
        "Candidates discarded by the aggregator, by reason"
    );
    describe_counter!(
        "palaver_watchdog_fired_total",
        "Transports that stayed non-writable past the call setup timeout"
    );
    describe_counter!(
        "palaver_negotiations_completed_total",
        "Sessions that reached the answer-received state"
    );
    describe_counter!(
        "palaver_offers_rejected_total",
        "Offer requests refused before a description was built"
    );
}

/// Record discarded candidates. `reason` is one of `duplicate`, `capacity`,
/// `unknown_channel` or `missing_endpoint`.
pub fn record_candidates_dropped(reason: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!("palaver_candidates_dropped_total", "reason" => reason.to_string())
        .increment(count as u64);
}

pub fn record_watchdog_fired(content_name: &str) {
    counter!("palaver_watchdog_fired_total", "content" => content_name.to_string()).increment(1);
}

pub fn record_negotiation_completed() {
    counter!("palaver_negotiations_completed_total").increment(1);
}

pub fn record_offer_rejected(reason: &str) {
    counter!("palaver_offers_rejected_total", "reason" => reason.to_string()).increment(1);
}
