//! Collaborator interfaces around the pipeline
//!
//! The pipeline never touches a radio or a notification stack directly.
//! Receive paths push raw payloads through a [`BroadcastSink`], aggregated
//! state leaves through a [`Publisher`], and beacons push their payloads
//! through an [`Advertiser`].

use crate::error::PublishError;
use crate::protocol::SenderId;
use crate::shadow::ShadowState;

/// Entry point for inbound broadcasts
pub trait BroadcastSink {
    /// Deliver the manufacturer-data bytes received from `sender`
    fn on_broadcast(&mut self, sender: SenderId, payload: &[u8]);
}

/// Downstream notification of shadow updates.
///
/// Called once per aggregated packet with a copy of the shadow. Expected to
/// return quickly; rate control and delivery guarantees belong to the
/// implementation. Failures are logged by the caller and never retried.
pub trait Publisher {
    /// Publish a snapshot of the shadow
    fn publish(&mut self, snapshot: ShadowState) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, snapshot: ShadowState) -> Result<(), PublishError> {
        (**self).publish(snapshot)
    }
}

/// Outbound side of a beacon: replaces the bytes being advertised
pub trait Advertiser {
    /// Error raised by the underlying transport
    type Error;

    /// Start advertising `payload` in place of the previous one
    fn update_advertising(&mut self, payload: &[u8]) -> Result<(), Self::Error>;
}

/// Publisher that keeps every snapshot in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Vec<ShadowState>,
}

impl MemoryPublisher {
    /// Create an empty publisher
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots published so far, oldest first
    pub fn published(&self) -> &[ShadowState] {
        &self.published
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, snapshot: ShadowState) -> Result<(), PublishError> {
        self.published.push(snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_publisher_records() {
        let mut publisher = MemoryPublisher::new();
        assert!(publisher.published().is_empty());

        let snapshot = ShadowState {
            concentrator_timestamp: 5,
            light: 10,
        };
        publisher.publish(snapshot).unwrap();
        assert_eq!(publisher.published(), &[snapshot]);
    }

    #[test]
    fn test_boxed_publisher() {
        let mut publisher: Box<dyn Publisher> = Box::new(MemoryPublisher::new());
        assert!(publisher.publish(ShadowState::default()).is_ok());
    }
}
