// Shadowcast Concentrator - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for the concentrator.
//!
//! The pipeline keeps its own atomic counters; these gauges mirror them and
//! are refreshed right before each scrape.

use lazy_static::lazy_static;
use prometheus::{register_int_gauge, Encoder, IntGauge, TextEncoder};
use shadowcast::{MetricsSnapshot, ShadowState};
use tracing::error;

lazy_static! {
    // ============================================================
    // Pipeline counters (from MetricsSnapshot)
    // ============================================================

    /// Payloads delivered by the scanner.
    pub static ref RECEIVED_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_received_total",
        "Advertisements delivered to the pipeline"
    ).unwrap();

    /// Payloads the decoder rejected.
    pub static ref DECODE_FAILURES_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_decode_failures_total",
        "Advertisements rejected by the decoder"
    ).unwrap();

    /// Repeated advertisements of an already accepted reading.
    pub static ref DUPLICATES_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_duplicates_total",
        "Readings rejected by the duplicate filter"
    ).unwrap();

    pub static ref ENQUEUED_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_enqueued_total",
        "Packets placed on the ingestion queue"
    ).unwrap();

    /// Old packets discarded to make room for new ones.
    pub static ref PURGED_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_purged_total",
        "Queued packets purged under storage pressure"
    ).unwrap();

    pub static ref DROPPED_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_dropped_total",
        "New packets dropped after purge recovery failed"
    ).unwrap();

    pub static ref PUBLISHED_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_published_total",
        "Shadow snapshots delivered to subscribers"
    ).unwrap();

    /// Snapshots aggregated while no subscriber was attached.
    pub static ref PUBLISH_FAILURES_TOTAL: IntGauge = register_int_gauge!(
        "shadowcast_publish_failures_total",
        "Shadow snapshots the publisher refused"
    ).unwrap();

    // ============================================================
    // Shadow state
    // ============================================================

    pub static ref SHADOW_LIGHT: IntGauge = register_int_gauge!(
        "shadowcast_shadow_light",
        "Last light reading in the shadow (raw units)"
    ).unwrap();

    pub static ref SHADOW_TIMESTAMP_MS: IntGauge = register_int_gauge!(
        "shadowcast_shadow_timestamp_ms",
        "Concentrator uptime at the last aggregation"
    ).unwrap();

    pub static ref SUBSCRIBERS: IntGauge = register_int_gauge!(
        "shadowcast_subscribers",
        "Attached shadow subscribers"
    ).unwrap();
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Update pipeline gauges from a counter snapshot.
pub fn update_pipeline_metrics(snapshot: &MetricsSnapshot) {
    RECEIVED_TOTAL.set(clamp(snapshot.received));
    DECODE_FAILURES_TOTAL.set(clamp(snapshot.decode_failures));
    DUPLICATES_TOTAL.set(clamp(snapshot.duplicates));
    ENQUEUED_TOTAL.set(clamp(snapshot.enqueued));
    PURGED_TOTAL.set(clamp(snapshot.purged));
    DROPPED_TOTAL.set(clamp(snapshot.dropped));
    PUBLISHED_TOTAL.set(clamp(snapshot.published));
    PUBLISH_FAILURES_TOTAL.set(clamp(snapshot.publish_failures));
}

/// Update shadow gauges.
pub fn update_shadow_metrics(shadow: &ShadowState, subscribers: usize) {
    SHADOW_LIGHT.set(i64::from(shadow.light));
    SHADOW_TIMESTAMP_MS.set(i64::from(shadow.concentrator_timestamp));
    SUBSCRIBERS.set(subscribers as i64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
