//! Pipeline counters
//!
//! [`PipelineMetrics`] is shared between the receive path and the
//! aggregator, so every counter is atomic. [`MetricsSnapshot`] is a plain
//! copy suitable for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one pipeline
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    received: AtomicU64,
    decode_failures: AtomicU64,
    duplicates: AtomicU64,
    enqueued: AtomicU64,
    purged: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload reached the ingest entry point
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// A payload failed to decode
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A reading was rejected as a duplicate
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// A packet entered the queue, possibly after purging older ones
    pub fn record_enqueued(&self, purged: usize) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.purged.fetch_add(purged as u64, Ordering::Relaxed);
    }

    /// A packet could not be queued
    pub fn record_dropped(&self, purged: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.purged.fetch_add(purged as u64, Ordering::Relaxed);
    }

    /// A shadow snapshot was published
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// The publisher refused a snapshot
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    /// Payloads delivered by the transport
    pub received: u64,
    /// Payloads rejected by the decoder
    pub decode_failures: u64,
    /// Readings rejected by the duplicate filter
    pub duplicates: u64,
    /// Packets queued
    pub enqueued: u64,
    /// Old packets discarded to make room
    pub purged: u64,
    /// New packets dropped for lack of storage
    pub dropped: u64,
    /// Snapshots published
    pub published: u64,
    /// Snapshots the publisher refused
    pub publish_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of received payloads that never reached the queue
    /// for a reason other than being a duplicate (0.0 - 1.0)
    pub fn loss_ratio(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        (self.decode_failures + self.dropped) as f64 / self.received as f64
    }

    /// Fraction of received payloads that were duplicates (0.0 - 1.0)
    pub fn duplicate_ratio(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.duplicates as f64 / self.received as f64
    }

    /// Packets aggregated so far, whether or not the publish succeeded
    pub fn aggregated(&self) -> u64 {
        self.published + self.publish_failures
    }
}
