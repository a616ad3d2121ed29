//! Duplicate reading suppression
//!
//! Beacons repeat the same advertisement many times between two
//! measurements. The [`DuplicateFilter`] remembers, per sender, the
//! timestamp of the last accepted reading and drops anything carrying the
//! same timestamp again.
//!
//! This is a single slot per sender, not a window: a sender whose clock
//! stutters and emits two distinct readings with the same timestamp loses
//! the second one. Entries are never evicted.

use std::collections::HashMap;

use log::trace;

use crate::protocol::{SenderId, SensorReading};

/// Per-sender last-seen timestamp table
#[derive(Debug, Clone, Default)]
pub struct DuplicateFilter {
    last_seen: HashMap<SenderId, u32>,
}

impl DuplicateFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `reading` from `sender` is new.
    ///
    /// Accepting updates the stored timestamp; a rejection leaves the table
    /// untouched.
    pub fn accept(&mut self, sender: SenderId, reading: &SensorReading) -> bool {
        match self.last_seen.insert(sender, reading.timestamp) {
            Some(previous) if previous == reading.timestamp => {
                trace!("Duplicate reading from {} at t={}", sender, reading.timestamp);
                false
            }
            _ => true,
        }
    }

    /// Last accepted timestamp for a sender
    pub fn last_timestamp(&self, sender: &SenderId) -> Option<u32> {
        self.last_seen.get(sender).copied()
    }

    /// Number of distinct senders seen
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Check if no sender has been seen yet
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Undo an acceptance whose reading never made it downstream.
    ///
    /// `previous` is what [`last_timestamp`](Self::last_timestamp) returned
    /// before the matching [`accept`](Self::accept); `None` removes the sender.
    pub fn rollback(&mut self, sender: SenderId, previous: Option<u32>) {
        match previous {
            Some(timestamp) => {
                self.last_seen.insert(sender, timestamp);
            }
            None => {
                self.last_seen.remove(&sender);
            }
        }
    }
}
