//! Prometheus metrics for the synchronizer

use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use std::sync::LazyLock;

/// Counters and gauges, labelled by symbol
pub struct SyncMetrics {
    /// Diff events by outcome (applied, stale, discarded)
    pub events: IntCounterVec,
    pub parse_errors: IntCounterVec,
    pub store_failures: IntCounterVec,
    pub sequence_gaps: IntCounterVec,
    pub last_update_id: IntGaugeVec,
    /// 0 seeding, 1 buffering, 2 synced, 3 desynced
    pub phase: IntGaugeVec,
}

static METRICS: LazyLock<SyncMetrics> = LazyLock::new(|| SyncMetrics {
    events: register_int_counter_vec!(
        "depth_sync_events_total",
        "Diff events handled, by outcome",
        &["symbol", "outcome"]
    )
    .expect("valid metric definition"),
    parse_errors: register_int_counter_vec!(
        "depth_sync_parse_errors_total",
        "Stream frames discarded because they could not be parsed",
        &["symbol"]
    )
    .expect("valid metric definition"),
    store_failures: register_int_counter_vec!(
        "depth_sync_store_failures_total",
        "Store writes dropped after retry",
        &["symbol"]
    )
    .expect("valid metric definition"),
    sequence_gaps: register_int_counter_vec!(
        "depth_sync_sequence_gaps_total",
        "Sequence gaps that desynchronized the book",
        &["symbol"]
    )
    .expect("valid metric definition"),
    last_update_id: register_int_gauge_vec!(
        "depth_sync_last_update_id",
        "Final update id of the last applied diff",
        &["symbol"]
    )
    .expect("valid metric definition"),
    phase: register_int_gauge_vec!(
        "depth_sync_phase",
        "Synchronization phase",
        &["symbol"]
    )
    .expect("valid metric definition"),
});

pub fn metrics() -> &'static SyncMetrics {
    &METRICS
}

/// Render the default registry in text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
