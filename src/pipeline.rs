//! Ingestion pipeline
//!
//! A [`Pipeline`] owns everything between the transport and the publisher:
//! the decoder, the duplicate filter, the ingestion queue and the shadow
//! aggregator. It is built once and split into its two execution contexts:
//!
//! ```text
//!  transport ──► Ingestor ──────────────► queue ──► ShadowAggregator ──► Publisher
//!                decode → dedup → enqueue            stamp → fold → publish
//! ```
//!
//! # Example
//!
//! ```rust
//! use shadowcast::{Encoder, MemoryPublisher, Pipeline, PipelineConfig, SenderId, SensorReading};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default(), MemoryPublisher::new()).unwrap();
//! let (mut ingestor, handle) = pipeline.spawn().unwrap();
//!
//! let sender = SenderId::random([0xC0, 0, 0, 0, 0, 1]);
//! let payload = Encoder::new().encode(&SensorReading::light(1, 10));
//! ingestor.ingest(sender, &payload);
//!
//! drop(ingestor);
//! let aggregator = handle.join().unwrap();
//! assert_eq!(aggregator.snapshot().light, 10);
//! ```

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, warn};

use crate::config::PipelineConfig;
use crate::decoder::Decoder;
use crate::error::{DecodeError, QueueError, Result};
use crate::filter::DuplicateFilter;
use crate::metrics::PipelineMetrics;
use crate::protocol::{SenderId, SensorPacket};
use crate::queue::{self, BoundedStorage, PacketStorage, Producer};
use crate::shadow::{Clock, MonotonicClock, ShadowAggregator};
use crate::transport::{BroadcastSink, Publisher};

/// What happened to one inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Queued for aggregation, after purging `purged` older packets
    Queued { purged: usize },
    /// Same timestamp as the sender's last reading
    Duplicate,
    /// Payload could not be decoded
    Rejected(DecodeError),
    /// No room in the queue, or the aggregator is gone
    Dropped(QueueError),
}

impl IngestOutcome {
    /// Check if the packet reached the queue
    pub fn is_queued(&self) -> bool {
        matches!(self, IngestOutcome::Queued { .. })
    }
}

/// Producer side of the pipeline: decode, filter, enqueue
pub struct Ingestor {
    decoder: Decoder,
    filter: Option<DuplicateFilter>,
    producer: Producer,
    metrics: Arc<PipelineMetrics>,
}

impl Ingestor {
    /// Run one payload through decode, duplicate filter and queue.
    ///
    /// Never blocks on the aggregator.
    pub fn ingest(&mut self, sender: SenderId, payload: &[u8]) -> IngestOutcome {
        self.metrics.record_received();

        let reading = match self.decoder.decode(payload) {
            Ok(reading) => reading,
            Err(e) => {
                self.metrics.record_decode_failure();
                warn!("Dropping payload from {}: {}", sender, e);
                return IngestOutcome::Rejected(e);
            }
        };

        let mut previous = None;
        if let Some(filter) = self.filter.as_mut() {
            previous = filter.last_timestamp(&sender);
            if !filter.accept(sender, &reading) {
                self.metrics.record_duplicate();
                return IngestOutcome::Duplicate;
            }
        }

        match self.producer.enqueue(SensorPacket::new(sender, reading)) {
            Ok(enqueued) => {
                self.metrics.record_enqueued(enqueued.purged);
                IngestOutcome::Queued {
                    purged: enqueued.purged,
                }
            }
            Err(e) => {
                let purged = match e {
                    QueueError::AllocationFailure { purged } => purged,
                    QueueError::Disconnected => {
                        error!("Shadow aggregator is gone, dropping reading from {}", sender);
                        0
                    }
                };
                // A repeat of a dropped reading must still get through.
                if let Some(filter) = self.filter.as_mut() {
                    filter.rollback(sender, previous);
                }
                self.metrics.record_dropped(purged);
                IngestOutcome::Dropped(e)
            }
        }
    }

    /// The duplicate filter, if enabled
    pub fn filter(&self) -> Option<&DuplicateFilter> {
        self.filter.as_ref()
    }

    /// Packets waiting for the aggregator
    pub fn pending(&self) -> usize {
        self.producer.len()
    }

    /// Shared pipeline counters
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }
}

impl BroadcastSink for Ingestor {
    fn on_broadcast(&mut self, sender: SenderId, payload: &[u8]) {
        self.ingest(sender, payload);
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("duplicate_filter", &self.filter.is_some())
            .field("producer", &self.producer)
            .finish()
    }
}

/// The assembled pipeline, before it is split across threads
pub struct Pipeline<P, C = MonotonicClock> {
    ingestor: Ingestor,
    aggregator: ShadowAggregator<P, C>,
}

impl<P: Publisher> Pipeline<P> {
    /// Build a pipeline on the uptime clock
    pub fn new(config: PipelineConfig, publisher: P) -> Result<Self> {
        Self::with_clock(config, publisher, MonotonicClock::new())
    }
}

impl<P: Publisher, C: Clock> Pipeline<P, C> {
    /// Build a pipeline on a custom clock
    pub fn with_clock(config: PipelineConfig, publisher: P, clock: C) -> Result<Self> {
        let storage = Arc::new(BoundedStorage::new(config.queue_capacity));
        Self::with_storage(config, storage, publisher, clock)
    }

    /// Build a pipeline drawing queue slots from `storage`.
    ///
    /// `config.queue_capacity` is still validated but the storage decides
    /// how many packets fit.
    pub fn with_storage(
        config: PipelineConfig,
        storage: Arc<dyn PacketStorage>,
        publisher: P,
        clock: C,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PipelineMetrics::new());
        let (producer, consumer) = queue::with_storage(storage, config.purge_limit);

        let ingestor = Ingestor {
            decoder: Decoder::new(),
            filter: config.duplicate_filter.then(DuplicateFilter::new),
            producer,
            metrics: Arc::clone(&metrics),
        };
        let aggregator = ShadowAggregator::with_clock(consumer, publisher, clock, metrics);

        Ok(Self {
            ingestor,
            aggregator,
        })
    }

    /// The producer side
    pub fn ingestor_mut(&mut self) -> &mut Ingestor {
        &mut self.ingestor
    }

    /// The consumer side
    pub fn aggregator_mut(&mut self) -> &mut ShadowAggregator<P, C> {
        &mut self.aggregator
    }

    /// Shared pipeline counters
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.ingestor.metrics()
    }

    /// Split into the producer and consumer halves
    pub fn into_parts(self) -> (Ingestor, ShadowAggregator<P, C>) {
        (self.ingestor, self.aggregator)
    }
}

impl<P, C> Pipeline<P, C>
where
    P: Publisher + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Start the aggregator on its own thread.
    ///
    /// The thread runs until the returned [`Ingestor`] is dropped, then
    /// yields the aggregator through the join handle.
    pub fn spawn(self) -> io::Result<(Ingestor, JoinHandle<ShadowAggregator<P, C>>)> {
        let (ingestor, aggregator) = self.into_parts();
        let handle = thread::Builder::new()
            .name("shadow-aggregator".to_string())
            .spawn(move || aggregator.run())?;
        Ok((ingestor, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::protocol::{SensorReading, KIND_OFFSET};
    use crate::shadow::ManualClock;
    use crate::transport::MemoryPublisher;

    const ID_A: SenderId = SenderId::random([0xC0, 0, 0, 0, 0, 0x0A]);
    const ID_B: SenderId = SenderId::random([0xC0, 0, 0, 0, 0, 0x0B]);

    fn light(ts: u32, value: u16) -> Vec<u8> {
        Encoder::new().encode(&SensorReading::light(ts, value))
    }

    fn pipeline(config: PipelineConfig) -> Pipeline<MemoryPublisher, ManualClock> {
        Pipeline::with_clock(config, MemoryPublisher::new(), ManualClock::starting_at(0)).unwrap()
    }

    #[test]
    fn test_ingest_queues_new_reading() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let outcome = pipeline.ingestor_mut().ingest(ID_A, &light(1, 10));
        assert_eq!(outcome, IngestOutcome::Queued { purged: 0 });
        assert!(outcome.is_queued());
        assert_eq!(pipeline.ingestor_mut().pending(), 1);
    }

    #[test]
    fn test_ingest_rejects_duplicate() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let ingestor = pipeline.ingestor_mut();
        ingestor.ingest(ID_A, &light(1, 10));
        assert_eq!(ingestor.ingest(ID_A, &light(1, 10)), IngestOutcome::Duplicate);
        assert_eq!(ingestor.pending(), 1);
        assert_eq!(ingestor.metrics().snapshot().duplicates, 1);
    }

    #[test]
    fn test_ingest_without_filter_forwards_duplicates() {
        let mut pipeline = pipeline(PipelineConfig::without_duplicate_filter());
        let ingestor = pipeline.ingestor_mut();
        assert!(ingestor.filter().is_none());
        assert!(ingestor.ingest(ID_A, &light(1, 10)).is_queued());
        assert!(ingestor.ingest(ID_A, &light(1, 10)).is_queued());
    }

    #[test]
    fn test_ingest_rejects_bad_payload() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let mut bytes = light(1, 10);
        bytes[KIND_OFFSET] = 9;

        let ingestor = pipeline.ingestor_mut();
        assert_eq!(
            ingestor.ingest(ID_A, &bytes),
            IngestOutcome::Rejected(DecodeError::UnsupportedType(9))
        );
        assert!(matches!(
            ingestor.ingest(ID_A, &bytes[..5]),
            IngestOutcome::Rejected(DecodeError::Truncated { .. })
        ));
        assert_eq!(ingestor.pending(), 0);
        // Rejected payloads never reach the filter.
        assert!(ingestor.filter().unwrap().is_empty());
    }

    #[test]
    fn test_ingest_reports_purge() {
        let mut pipeline = pipeline(PipelineConfig {
            queue_capacity: 2,
            ..Default::default()
        });
        let ingestor = pipeline.ingestor_mut();
        ingestor.ingest(ID_A, &light(1, 10));
        ingestor.ingest(ID_A, &light(2, 10));
        assert_eq!(
            ingestor.ingest(ID_A, &light(3, 10)),
            IngestOutcome::Queued { purged: 2 }
        );
        assert_eq!(ingestor.metrics().snapshot().purged, 2);
    }

    #[test]
    fn test_dropped_reading_stays_eligible() {
        let mut pipeline = pipeline(PipelineConfig {
            queue_capacity: 1,
            purge_limit: 0,
            ..Default::default()
        });

        assert!(pipeline.ingestor_mut().ingest(ID_B, &light(1, 10)).is_queued());
        assert_eq!(
            pipeline.ingestor_mut().ingest(ID_A, &light(7, 70)),
            IngestOutcome::Dropped(QueueError::AllocationFailure { purged: 0 })
        );
        assert_eq!(pipeline.ingestor_mut().filter().unwrap().last_timestamp(&ID_A), None);

        assert_eq!(pipeline.aggregator_mut().step().unwrap().light, 10);

        // The beacon repeats its advertisement; the repeat is the reading's second chance.
        assert_eq!(
            pipeline.ingestor_mut().ingest(ID_A, &light(7, 70)),
            IngestOutcome::Queued { purged: 0 }
        );
        assert_eq!(pipeline.aggregator_mut().step().unwrap().light, 70);

        let stats = pipeline.metrics().snapshot();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.duplicates, 0);
    }

    #[test]
    fn test_ingest_after_aggregator_dropped() {
        let (mut ingestor, aggregator) = pipeline(PipelineConfig::default()).into_parts();
        drop(aggregator);
        assert_eq!(
            ingestor.ingest(ID_A, &light(1, 10)),
            IngestOutcome::Dropped(QueueError::Disconnected)
        );
        assert_eq!(ingestor.metrics().snapshot().dropped, 1);
    }

    #[test]
    fn test_broadcast_sink_entry_point() {
        let mut pipeline = pipeline(PipelineConfig::default());
        pipeline.ingestor_mut().on_broadcast(ID_A, &light(4, 44));
        let snapshot = pipeline.aggregator_mut().step().unwrap();
        assert_eq!(snapshot.light, 44);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Pipeline::new(
            PipelineConfig::with_queue_capacity(0),
            MemoryPublisher::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_spawned_pipeline() {
        let pipeline = Pipeline::new(PipelineConfig::default(), MemoryPublisher::new()).unwrap();
        let metrics = pipeline.metrics();
        let (mut ingestor, handle) = pipeline.spawn().unwrap();

        for ts in 1..=3 {
            ingestor.ingest(ID_A, &light(ts, ts as u16 * 10));
        }
        drop(ingestor);

        let aggregator = handle.join().unwrap();
        assert_eq!(aggregator.snapshot().light, 30);
        assert_eq!(aggregator.publisher().published().len(), 3);
        assert_eq!(metrics.snapshot().published, 3);
    }
}
