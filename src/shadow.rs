//! Shadow state and its aggregator
//!
//! The [`ShadowAggregator`] is the only writer of the [`ShadowState`]. It
//! takes packets off the ingestion queue one at a time, stamps the shadow
//! with the concentrator clock, folds the reading in and hands a copy to the
//! [`Publisher`]. One publish per packet, no coalescing.
//!
//! The concentrator timestamp is taken when the packet is dequeued, not when
//! it was received, so packets that waited in the queue carry a later time.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::metrics::PipelineMetrics;
use crate::protocol::{Measurement, SensorPacket};
use crate::queue::{Consumer, QueuedPacket};
use crate::transport::Publisher;

/// Consolidated state republished to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShadowState {
    /// Concentrator uptime (ms) at the last aggregation
    pub concentrator_timestamp: u32,
    /// Last light reading, raw units
    pub light: u16,
}

impl ShadowState {
    /// Fold a measurement into the shadow
    pub fn apply(&mut self, measurement: &Measurement) {
        match *measurement {
            Measurement::Light(value) => self.light = value,
        }
    }
}

impl fmt::Display for ShadowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={}ms light={}",
            self.concentrator_timestamp, self.light
        )
    }
}

/// Concentrator-local millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin, wrapping at `u32::MAX`
    fn now_ms(&self) -> u32;

    /// Whole seconds since the same origin.
    ///
    /// The default derives it from [`now_ms`](Self::now_ms), so it wraps
    /// after about 49.7 days; clocks with a wider source override it.
    fn now_secs(&self) -> u32 {
        self.now_ms() / 1000
    }
}

// Seconds wrap after about 136 years.
fn whole_secs(elapsed: Duration) -> u32 {
    elapsed.as_secs() as u32
}

/// Uptime clock starting at construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock at zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        // Truncation wraps like a 32-bit uptime counter.
        self.origin.elapsed().as_millis() as u32
    }

    fn now_secs(&self) -> u32 {
        whole_secs(self.origin.elapsed())
    }
}

/// Hand-driven clock for simulations and tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock reading `start`
    pub fn starting_at(start: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u32) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Set the clock
    pub fn set(&self, ms: u32) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Single consumer folding queued packets into the shadow
pub struct ShadowAggregator<P, C = MonotonicClock> {
    consumer: Consumer,
    publisher: P,
    clock: C,
    shadow: ShadowState,
    last_packet: Option<SensorPacket>,
    metrics: Arc<PipelineMetrics>,
}

impl<P: Publisher> ShadowAggregator<P> {
    /// Create an aggregator on the uptime clock
    pub fn new(consumer: Consumer, publisher: P, metrics: Arc<PipelineMetrics>) -> Self {
        Self::with_clock(consumer, publisher, MonotonicClock::new(), metrics)
    }
}

impl<P: Publisher, C: Clock> ShadowAggregator<P, C> {
    /// Create an aggregator on a custom clock
    pub fn with_clock(
        consumer: Consumer,
        publisher: P,
        clock: C,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            consumer,
            publisher,
            clock,
            shadow: ShadowState::default(),
            last_packet: None,
            metrics,
        }
    }

    /// Aggregate one packet and publish the result.
    ///
    /// The packet is disposed of before returning.
    pub fn process(&mut self, mut packet: QueuedPacket) -> ShadowState {
        let now = self.clock.now_ms();
        packet.received_at = Some(now);
        self.shadow.concentrator_timestamp = now;
        self.shadow.apply(&packet.reading.measurement);

        match packet.reading.measurement {
            Measurement::Light(value) => debug!(
                "Light intensity from {}: {} lx (sent t={}s, received t={}ms)",
                packet.sender, value, packet.reading.timestamp, now
            ),
        }
        self.last_packet = Some(*packet);

        let snapshot = self.shadow;
        match self.publisher.publish(snapshot) {
            Ok(()) => self.metrics.record_published(),
            Err(e) => {
                self.metrics.record_publish_failure();
                debug!("Shadow update not published: {}", e);
            }
        }

        drop(packet);
        snapshot
    }

    /// Wait for the next packet and aggregate it.
    ///
    /// Returns `None` once the producer is gone and the queue is drained.
    pub fn step(&mut self) -> Option<ShadowState> {
        let packet = self.consumer.dequeue()?;
        Some(self.process(packet))
    }

    /// Aggregate until the producer disconnects, then hand the aggregator back
    pub fn run(mut self) -> Self {
        info!("Shadow aggregator started");
        while self.step().is_some() {}
        warn!("Ingestion queue closed, shadow aggregator stopping");
        self
    }

    /// Copy of the current shadow
    pub fn snapshot(&self) -> ShadowState {
        self.shadow
    }

    /// Copy of the last aggregated packet, stamped with its receipt time
    pub fn last_packet(&self) -> Option<&SensorPacket> {
        self.last_packet.as_ref()
    }

    /// The downstream publisher
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Packets waiting to be aggregated
    pub fn pending(&self) -> usize {
        self.consumer.len()
    }

    /// Split the aggregator into its publisher and final shadow
    pub fn into_parts(self) -> (P, ShadowState) {
        (self.publisher, self.shadow)
    }
}

impl<P, C> fmt::Debug for ShadowAggregator<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowAggregator")
            .field("shadow", &self.shadow)
            .field("consumer", &self.consumer)
            .finish()
    }
}
