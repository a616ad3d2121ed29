// Shadowcast Concentrator - UDP broadcast transport
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! UDP stand-in for the radio layer.
//!
//! Each datagram carries one advertisement:
//!
//! ```text
//! ┌───────────┬────────────────┬──────────────────────────┐
//! │ Addr type │ Address        │ Manufacturer data        │
//! │ 1 byte    │ 6 bytes        │ variable                 │
//! └───────────┴────────────────┴──────────────────────────┘
//! ```
//!
//! [`Scanner`] receives datagrams, drops those whose company id is not ours
//! and hands the rest to a [`BroadcastSink`]. [`UdpAdvertiser`] is the
//! sending side used by the beacon simulator.

use shadowcast::{peek_company_id, AddressKind, Advertiser, BroadcastSink, SenderId};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Address type + address
pub const DATAGRAM_HEADER_LEN: usize = 7;

/// Largest datagram the scanner accepts
const MAX_DATAGRAM_LEN: usize = 64;

/// How often the receive loop checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Datagram too short: {0} bytes")]
    ShortDatagram(usize),

    #[error("Unknown address type: {0}")]
    InvalidAddressKind(u8),
}

/// Frame one advertisement
pub fn encode_datagram(sender: SenderId, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(DATAGRAM_HEADER_LEN + payload.len());
    datagram.push(sender.kind as u8);
    datagram.extend_from_slice(&sender.addr);
    datagram.extend_from_slice(payload);
    datagram
}

/// Split a datagram into sender and manufacturer data
pub fn parse_datagram(datagram: &[u8]) -> Result<(SenderId, &[u8]), TransportError> {
    if datagram.len() < DATAGRAM_HEADER_LEN {
        return Err(TransportError::ShortDatagram(datagram.len()));
    }
    let kind =
        AddressKind::from_u8(datagram[0]).ok_or(TransportError::InvalidAddressKind(datagram[0]))?;
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&datagram[1..DATAGRAM_HEADER_LEN]);

    Ok((SenderId { kind, addr }, &datagram[DATAGRAM_HEADER_LEN..]))
}

/// Counters for one scan session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Advertisements handed to the sink
    pub delivered: u64,
    /// Advertisements from another company
    pub foreign: u64,
    /// Datagrams that could not be framed
    pub malformed: u64,
}

/// Receive side of the UDP transport
pub struct Scanner {
    socket: UdpSocket,
    company_id: u16,
    running: Arc<AtomicBool>,
    stats: ScanStats,
}

impl Scanner {
    /// Bind the scanner; it runs until `running` is cleared
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        company_id: u16,
        running: Arc<AtomicBool>,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(Self {
            socket,
            company_id,
            running,
            stats: ScanStats::default(),
        })
    }

    /// Address the scanner is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until stopped, feeding `sink`
    pub fn run<S: BroadcastSink>(&mut self, sink: &mut S) -> Result<ScanStats, TransportError> {
        info!(
            "Scanning for company 0x{:04X} on {}",
            self.company_id,
            self.socket.local_addr()?
        );
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        while self.running.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    trace!("Received {} bytes from {}", len, from);
                    self.handle_datagram(&buf[..len], sink);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Scanner stopped: {:?}", self.stats);
        Ok(self.stats)
    }

    /// Filter and deliver one datagram
    pub fn handle_datagram<S: BroadcastSink>(&mut self, datagram: &[u8], sink: &mut S) -> bool {
        let (sender, payload) = match parse_datagram(datagram) {
            Ok(parts) => parts,
            Err(e) => {
                self.stats.malformed += 1;
                debug!("Ignoring datagram: {}", e);
                return false;
            }
        };

        if peek_company_id(payload) != Some(self.company_id) {
            self.stats.foreign += 1;
            trace!("Ignoring foreign advertisement from {}", sender);
            return false;
        }

        self.stats.delivered += 1;
        sink.on_broadcast(sender, payload);
        true
    }
}

/// Send side of the UDP transport: one datagram per advertising update
pub struct UdpAdvertiser {
    socket: UdpSocket,
    target: SocketAddr,
    sender: SenderId,
}

impl UdpAdvertiser {
    /// Advertise as `sender` towards `target`
    pub fn new(target: SocketAddr, sender: SenderId) -> io::Result<Self> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        Ok(Self {
            socket: UdpSocket::bind(bind)?,
            target,
            sender,
        })
    }

    /// Identity carried by every datagram
    pub fn sender(&self) -> SenderId {
        self.sender
    }
}

impl Advertiser for UdpAdvertiser {
    type Error = io::Error;

    fn update_advertising(&mut self, payload: &[u8]) -> io::Result<()> {
        self.socket
            .send_to(&encode_datagram(self.sender, payload), self.target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowcast::{Encoder, SensorReading};

    const SENDER: SenderId = SenderId::random([0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01]);

    #[derive(Default)]
    struct RecordingSink {
        received: Vec<(SenderId, Vec<u8>)>,
    }

    impl BroadcastSink for RecordingSink {
        fn on_broadcast(&mut self, sender: SenderId, payload: &[u8]) {
            self.received.push((sender, payload.to_vec()));
        }
    }

    fn scanner(company_id: u16) -> Scanner {
        Scanner::bind("127.0.0.1:0", company_id, Arc::new(AtomicBool::new(true))).unwrap()
    }

    #[test]
    fn test_datagram_framing() {
        let payload = Encoder::new().encode(&SensorReading::light(3, 30));
        let datagram = encode_datagram(SENDER, &payload);
        assert_eq!(datagram.len(), DATAGRAM_HEADER_LEN + payload.len());
        assert_eq!(datagram[0], 1);

        let (sender, body) = parse_datagram(&datagram).unwrap();
        assert_eq!(sender, SENDER);
        assert_eq!(body, &payload[..]);
    }

    #[test]
    fn test_parse_rejects_bad_datagrams() {
        assert!(matches!(
            parse_datagram(&[1, 2, 3]),
            Err(TransportError::ShortDatagram(3))
        ));
        assert!(matches!(
            parse_datagram(&[7, 0, 0, 0, 0, 0, 0]),
            Err(TransportError::InvalidAddressKind(7))
        ));
    }

    #[test]
    fn test_scanner_filters_company() {
        let mut scanner = scanner(0x0059);
        let mut sink = RecordingSink::default();

        let ours = Encoder::new().encode(&SensorReading::light(1, 10));
        let theirs = Encoder::with_company_id(0x004C).encode(&SensorReading::light(1, 10));

        assert!(scanner.handle_datagram(&encode_datagram(SENDER, &ours), &mut sink));
        assert!(!scanner.handle_datagram(&encode_datagram(SENDER, &theirs), &mut sink));
        assert!(!scanner.handle_datagram(&[0xFF], &mut sink));

        assert_eq!(sink.received, vec![(SENDER, ours)]);
        assert_eq!(
            scanner.stats,
            ScanStats {
                delivered: 1,
                foreign: 1,
                malformed: 1
            }
        );
    }

    #[test]
    fn test_advertiser_reaches_scanner() {
        let running = Arc::new(AtomicBool::new(true));
        let mut scanner = Scanner::bind("127.0.0.1:0", 0x0059, Arc::clone(&running)).unwrap();
        let target = scanner.local_addr().unwrap();

        let mut advertiser = UdpAdvertiser::new(target, SENDER).unwrap();
        let payload = Encoder::new().encode(&SensorReading::light(9, 90));
        advertiser.update_advertising(&payload).unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let (len, _) = scanner.socket.recv_from(&mut buf).unwrap();
        let mut sink = RecordingSink::default();
        assert!(scanner.handle_datagram(&buf[..len], &mut sink));
        assert_eq!(sink.received[0].0, advertiser.sender());
        assert_eq!(sink.received[0].1, payload);
    }

    #[test]
    fn test_run_stops_when_cleared() {
        let running = Arc::new(AtomicBool::new(false));
        let mut scanner = Scanner::bind("127.0.0.1:0", 0x0059, running).unwrap();
        let stats = scanner.run(&mut RecordingSink::default()).unwrap();
        assert_eq!(stats, ScanStats::default());
    }
}
