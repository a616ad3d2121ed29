//! Error types for shadowcast
//!
//! This module defines all error types used throughout the library.
//! None of them is fatal to the process: each one costs at most the
//! packet that triggered it.

use thiserror::Error;

/// Result type alias for shadowcast operations
pub type Result<T> = std::result::Result<T, ShadowcastError>;

/// Main error type for shadowcast operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShadowcastError {
    /// Encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Ingestion queue error
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Downstream publication error
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors during encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Destination buffer too small
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Errors during decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Discriminant has no declared length
    #[error("Unsupported sensor type: {0}")]
    UnsupportedType(u8),

    /// Fewer bytes than the discriminant declares
    #[error("Truncated payload: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
}

/// Errors raised by the ingestion queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No storage for the packet, even after purging
    #[error("Out of packet storage after purging {purged} old packets")]
    AllocationFailure { purged: usize },

    /// The other end of the queue is gone
    #[error("Queue disconnected")]
    Disconnected,
}

/// Errors reported by a downstream publisher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Nobody is listening for notifications
    #[error("No subscriber attached")]
    NoSubscriber,

    /// Delivery failed in the transport below the publisher
    #[error("Delivery failed: {0}")]
    Delivery(String),
}
