//! # Shadowcast - sensor broadcast concentrator
//!
//! Battery-powered sensors advertise their readings as BLE manufacturer
//! data. A concentrator listens to those broadcasts, consolidates the
//! latest values into a single *shadow* and republishes it to subscribers.
//!
//! ## Key Features
//!
//! - **Compact wire format**: 8-byte header plus a typed body, little endian
//! - **Duplicate suppression**: repeated advertisements of a reading are dropped
//! - **Bounded ingestion**: the receive path never waits on the aggregator
//! - **Single writer**: one aggregator owns the shadow and publishes once per packet
//!
//! ## Quick Start
//!
//! ```rust
//! use shadowcast::{Decoder, Encoder, Measurement, SensorReading};
//!
//! let reading = SensorReading::light(12, 340);
//! let payload = Encoder::new().encode(&reading);
//! assert_eq!(payload.len(), 10);
//!
//! let decoded = Decoder::new().decode(&payload).unwrap();
//! assert_eq!(decoded.measurement, Measurement::Light(340));
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Sensor kinds, readings, sender identity and wire layout
//! - [`encoder`]: Reading to payload
//! - [`decoder`]: Payload to reading
//! - [`filter`]: Per-sender duplicate filter
//! - [`queue`]: Bounded ingestion queue with purge-on-full
//! - [`shadow`]: Shadow state and the aggregator that owns it
//! - [`pipeline`]: Decode, filter, queue and aggregate wired together
//! - [`transport`]: Collaborator traits for receive, publish and advertise
//! - [`metrics`]: Pipeline counters

// Modules
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod shadow;
pub mod transport;

// Re-exports for convenient access
pub use config::PipelineConfig;
pub use decoder::{peek_company_id, Decoder, PayloadHeader};
pub use encoder::Encoder;
pub use error::{
    DecodeError, EncodeError, PublishError, QueueError, Result, ShadowcastError,
};
pub use filter::DuplicateFilter;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{IngestOutcome, Ingestor, Pipeline};
pub use protocol::{
    AddressKind, Measurement, ParseSenderIdError, SenderId, SensorKind, SensorPacket,
    SensorReading, COMPANY_ID,
};
pub use queue::{
    BoundedStorage, Consumer, Enqueued, PacketStorage, Producer, QueuedPacket,
    DEFAULT_PURGE_LIMIT,
};
pub use shadow::{Clock, ManualClock, MonotonicClock, ShadowAggregator, ShadowState};
pub use transport::{Advertiser, BroadcastSink, MemoryPublisher, Publisher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_roundtrip() {
        let reading = SensorReading::light(7, 1234);
        let payload = Encoder::new().encode(&reading);
        assert_eq!(peek_company_id(&payload), Some(COMPANY_ID));
        assert_eq!(Decoder::new().decode(&payload).unwrap(), reading);
    }
}
