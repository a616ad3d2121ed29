//! Bounded ingestion queue
//!
//! Single-producer/single-consumer FIFO between the receive path and the
//! shadow aggregator. Every queued packet holds one storage slot taken from
//! a [`PacketStorage`]; the slot goes back when the consumer drops the
//! [`QueuedPacket`].
//!
//! When no slot is available, [`Producer::enqueue`] discards up to
//! `purge_limit` of the oldest queued packets and retries once. If that
//! still fails the new packet is dropped. The producer never waits for the
//! consumer.
//!
//! ```rust
//! use shadowcast::queue;
//! use shadowcast::{SenderId, SensorPacket, SensorReading};
//!
//! let (mut producer, mut consumer) = queue::bounded(8, 5);
//! let sender = SenderId::random([0xC0, 0, 0, 0, 0, 1]);
//! producer.enqueue(SensorPacket::new(sender, SensorReading::light(1, 10))).unwrap();
//!
//! let packet = consumer.dequeue().unwrap();
//! assert_eq!(packet.reading, SensorReading::light(1, 10));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{error, warn};

use crate::error::QueueError;
use crate::protocol::SensorPacket;

/// Default number of old packets purged to make room for a new one
pub const DEFAULT_PURGE_LIMIT: usize = 5;

/// Source of per-packet storage
pub trait PacketStorage: Send + Sync {
    /// Take one slot; `false` when storage is exhausted
    fn try_reserve(&self) -> bool;

    /// Give back a slot obtained from [`try_reserve`](Self::try_reserve)
    fn release(&self);
}

/// Fixed pool of packet slots
#[derive(Debug)]
pub struct BoundedStorage {
    capacity: usize,
    in_use: AtomicUsize,
}

impl BoundedStorage {
    /// Create a pool with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held by queued or in-flight packets
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}

impl PacketStorage for BoundedStorage {
    fn try_reserve(&self) -> bool {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Storage slot returned on drop
struct Slot {
    storage: Arc<dyn PacketStorage>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.storage.release();
    }
}

/// A packet owned by the queue or by the consumer that took it.
///
/// Dropping it disposes of the packet and frees its storage slot.
pub struct QueuedPacket {
    packet: SensorPacket,
    _slot: Slot,
}

impl QueuedPacket {
    /// Take the packet out, releasing its storage slot
    pub fn into_inner(self) -> SensorPacket {
        self.packet
    }
}

impl Deref for QueuedPacket {
    type Target = SensorPacket;

    fn deref(&self) -> &SensorPacket {
        &self.packet
    }
}

impl DerefMut for QueuedPacket {
    fn deref_mut(&mut self) -> &mut SensorPacket {
        &mut self.packet
    }
}

impl fmt::Debug for QueuedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueuedPacket").field(&self.packet).finish()
    }
}

/// Successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    /// Old packets discarded to make room
    pub purged: usize,
}

struct State {
    items: VecDeque<QueuedPacket>,
    producer_alive: bool,
    consumer_alive: bool,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
    storage: Arc<dyn PacketStorage>,
    purge_limit: usize,
}

impl Shared {
    // Nothing panics while the lock is held, so a poisoned state is intact.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create a queue backed by a [`BoundedStorage`] of `capacity` slots
pub fn bounded(capacity: usize, purge_limit: usize) -> (Producer, Consumer) {
    with_storage(Arc::new(BoundedStorage::new(capacity)), purge_limit)
}

/// Create a queue drawing slots from `storage`
pub fn with_storage(storage: Arc<dyn PacketStorage>, purge_limit: usize) -> (Producer, Consumer) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::new(),
            producer_alive: true,
            consumer_alive: true,
        }),
        available: Condvar::new(),
        storage,
        purge_limit,
    });

    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

/// Sending half. Not `Clone`: there is exactly one producer.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Append a fully built packet.
    ///
    /// On storage exhaustion, purges up to the purge limit of the oldest
    /// packets and retries once. Fails with
    /// [`QueueError::AllocationFailure`] if the retry fails too; the packets
    /// already purged stay purged.
    pub fn enqueue(&mut self, packet: SensorPacket) -> Result<Enqueued, QueueError> {
        if !self.shared.lock().consumer_alive {
            return Err(QueueError::Disconnected);
        }

        let mut purged = 0;
        if !self.shared.storage.try_reserve() {
            error!("Out of packet storage, purging oldest packets");
            purged = self.purge_oldest(self.shared.purge_limit);

            if !self.shared.storage.try_reserve() {
                error!(
                    "Still out of packet storage after purging {} packets, dropping packet from {}",
                    purged, packet.sender
                );
                return Err(QueueError::AllocationFailure { purged });
            }
            warn!("Recovered after purging {} old packets", purged);
        }

        let queued = QueuedPacket {
            packet,
            _slot: Slot {
                storage: Arc::clone(&self.shared.storage),
            },
        };

        let mut state = self.shared.lock();
        if !state.consumer_alive {
            return Err(QueueError::Disconnected);
        }
        state.items.push_back(queued);
        drop(state);
        self.shared.available.notify_one();

        Ok(Enqueued { purged })
    }

    /// Discard up to `limit` of the oldest packets
    fn purge_oldest(&self, limit: usize) -> usize {
        let mut state = self.shared.lock();
        let count = limit.min(state.items.len());
        // Dropping each packet hands its slot back to storage.
        state.items.drain(..count).for_each(drop);
        count
    }

    /// Number of packets waiting
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of packets purged per failed enqueue
    pub fn purge_limit(&self) -> usize {
        self.shared.purge_limit
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.shared.lock().producer_alive = false;
        self.shared.available.notify_all();
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("pending", &self.len())
            .field("purge_limit", &self.shared.purge_limit)
            .finish()
    }
}

/// Receiving half. Not `Clone`: there is exactly one consumer.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Block until a packet is available.
    ///
    /// Returns `None` once the producer is gone and the queue is drained.
    pub fn dequeue(&mut self) -> Option<QueuedPacket> {
        let mut state = self.shared.lock();
        loop {
            if let Some(packet) = state.items.pop_front() {
                return Some(packet);
            }
            if !state.producer_alive {
                return None;
            }
            state = self
                .shared
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of packets waiting
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.consumer_alive = false;
        state.items.clear();
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("pending", &self.len())
            .finish()
    }
}
