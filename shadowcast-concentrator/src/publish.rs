// Shadowcast Concentrator - shadow publication
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shadow publication to subscribers.
//!
//! [`SubscriberPublisher`] is the aggregator's [`Publisher`]. It keeps the
//! latest snapshot for HTTP readers and fans every snapshot out to attached
//! subscribers. With nobody attached it reports
//! [`PublishError::NoSubscriber`], which the aggregator logs and moves on.

use shadowcast::{PublishError, Publisher, ShadowState};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Publisher side, owned by the aggregator thread
pub struct SubscriberPublisher {
    latest: watch::Sender<ShadowState>,
    subscribers: broadcast::Sender<ShadowState>,
}

/// Read side, cloned into HTTP handlers and notifier tasks
#[derive(Clone)]
pub struct ShadowHandle {
    latest: watch::Receiver<ShadowState>,
    subscribers: broadcast::Sender<ShadowState>,
}

impl SubscriberPublisher {
    /// Create a publisher buffering up to `capacity` snapshots per subscriber
    pub fn new(capacity: usize) -> (Self, ShadowHandle) {
        let (latest_tx, latest_rx) = watch::channel(ShadowState::default());
        let (subscribers, _) = broadcast::channel(capacity.max(1));

        let handle = ShadowHandle {
            latest: latest_rx,
            subscribers: subscribers.clone(),
        };
        (
            Self {
                latest: latest_tx,
                subscribers,
            },
            handle,
        )
    }
}

impl Publisher for SubscriberPublisher {
    fn publish(&mut self, snapshot: ShadowState) -> Result<(), PublishError> {
        self.latest.send_replace(snapshot);
        self.subscribers
            .send(snapshot)
            .map(|_| ())
            .map_err(|_| PublishError::NoSubscriber)
    }
}

impl ShadowHandle {
    /// Latest published snapshot
    pub fn current(&self) -> ShadowState {
        *self.latest.borrow()
    }

    /// Attach a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<ShadowState> {
        self.subscribers.subscribe()
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.receiver_count()
    }
}

/// Forward every snapshot to `target` as a JSON datagram.
///
/// Returns the number of notifications sent once the publisher is gone.
pub async fn forward_notifications(
    mut rx: broadcast::Receiver<ShadowState>,
    socket: UdpSocket,
    target: SocketAddr,
) -> u64 {
    info!("Forwarding shadow notifications to {}", target);
    let mut sent = 0;

    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                let body = match serde_json::to_vec(&snapshot) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Failed to serialize shadow: {}", e);
                        continue;
                    }
                };
                match socket.send_to(&body, target).await {
                    Ok(_) => {
                        sent += 1;
                        debug!("Notified {}: {}", target, snapshot);
                    }
                    Err(e) => warn!("Notification to {} failed: {}", target, e),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Notifier lagging, skipped {} snapshots", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    info!("Notification forwarder stopped after {} notifications", sent);
    sent
}
