//! Protocol definitions for shadowcast
//!
//! This module defines the core types carried by a beacon broadcast:
//! - Wire layout constants and the company identifier
//! - Sensor kinds and their encoded lengths
//! - Readings, sender identities and queued packets
//!
//! # Wire format
//!
//! ```text
//! [company_id: 2 LE] [kind: 1] [reserved: 1] [timestamp: 4 LE] [body: N]
//!
//! Light body:
//! [lux: 2 LE]
//! ```

use std::fmt;
use std::str::FromStr;

/// Company identifier carried in every manufacturer-data payload
pub const COMPANY_ID: u16 = 0x0059;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 8;

/// Offset of the company identifier
pub const COMPANY_ID_OFFSET: usize = 0;
/// Offset of the kind discriminant
pub const KIND_OFFSET: usize = 2;
/// Offset of the reserved byte (kept zero, pads the timestamp to 4 bytes)
pub const RESERVED_OFFSET: usize = 3;
/// Offset of the sender-local timestamp
pub const TIMESTAMP_OFFSET: usize = 4;

/// Discriminant sensors use to flag a failed measurement. Never decodable.
pub const KIND_ERROR: u8 = 0;

/// Largest payload any supported kind produces
pub const MAX_PAYLOAD_LEN: usize = HEADER_LEN + 2;

/// Fixed-point scale factors used by the sensor fleet.
///
/// Only [`LIGHT`](scale::LIGHT) has a codec path; the others document how
/// the remaining sensors scale their values.
pub mod scale {
    /// Latitude/longitude in 1e-7 degrees
    pub const LAT_LON: i64 = 10_000_000;
    /// Temperature in centi-degrees
    pub const TEMPERATURE: i32 = 100;
    /// Pressure in 0.1 hPa
    pub const PRESSURE: i32 = 10;
    /// Light in raw sensor units
    pub const LIGHT: i32 = 1;
    /// Acceleration in milli-g
    pub const ACCELERATION: i32 = 1000;
}

/// Sensor kinds with an encoding path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorKind {
    /// Light intensity
    Light = 1,
}

impl SensorKind {
    /// Convert from the wire discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SensorKind::Light),
            _ => None,
        }
    }

    /// Body length following the header
    pub fn body_len(&self) -> usize {
        match self {
            SensorKind::Light => 2,
        }
    }

    /// Total encoded length (header + body)
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body_len()
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Light => write!(f, "light"),
        }
    }
}

/// Encoded length for a raw discriminant, `None` when it has no encoding.
pub fn encoded_len(discriminant: u8) -> Option<usize> {
    SensorKind::from_u8(discriminant).map(|kind| kind.encoded_len())
}

/// Type-specific value of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measurement {
    /// Light intensity, scaled by [`scale::LIGHT`]
    Light(u16),
}

impl Measurement {
    /// Kind of this measurement
    pub fn kind(&self) -> SensorKind {
        match self {
            Measurement::Light(_) => SensorKind::Light,
        }
    }
}

/// A reading as broadcast by a beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorReading {
    /// Sender-local monotonic clock, in seconds
    pub timestamp: u32,
    /// The measured value
    pub measurement: Measurement,
}

impl SensorReading {
    /// Create a reading
    pub fn new(timestamp: u32, measurement: Measurement) -> Self {
        Self {
            timestamp,
            measurement,
        }
    }

    /// Create a light reading
    pub fn light(timestamp: u32, value: u16) -> Self {
        Self::new(timestamp, Measurement::Light(value))
    }

    /// Kind of this reading
    pub fn kind(&self) -> SensorKind {
        self.measurement.kind()
    }

    /// Size of the encoded reading in bytes
    pub fn encoded_len(&self) -> usize {
        self.kind().encoded_len()
    }
}

/// Address type of a broadcasting device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AddressKind {
    /// IEEE-assigned public address
    #[default]
    Public = 0,
    /// Random (static or private) address
    Random = 1,
}

impl AddressKind {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AddressKind::Public),
            1 => Some(AddressKind::Random),
            _ => None,
        }
    }
}

/// Broadcast address identifying a sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId {
    /// Address type
    pub kind: AddressKind,
    /// Address bytes, most significant first
    pub addr: [u8; 6],
}

impl SenderId {
    /// Create a public-address sender
    pub const fn public(addr: [u8; 6]) -> Self {
        Self {
            kind: AddressKind::Public,
            addr,
        }
    }

    /// Create a random-address sender
    pub const fn random(addr: [u8; 6]) -> Self {
        Self {
            kind: AddressKind::Random,
            addr,
        }
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.addr;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )?;
        match self.kind {
            AddressKind::Public => write!(f, " (public)"),
            AddressKind::Random => write!(f, " (random)"),
        }
    }
}

/// Error parsing a [`SenderId`] from text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSenderIdError(String);

impl fmt::Display for ParseSenderIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid sender address: {}", self.0)
    }
}

impl std::error::Error for ParseSenderIdError {}

impl FromStr for SenderId {
    type Err = ParseSenderIdError;

    /// Parses `AA:BB:CC:DD:EE:FF`, optionally followed by `(public)` or
    /// `(random)`. A bare address is public.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, kind) = match s.split_once(' ') {
            Some((addr, suffix)) => {
                let kind = match suffix.trim() {
                    "(public)" => AddressKind::Public,
                    "(random)" => AddressKind::Random,
                    _ => return Err(ParseSenderIdError(s.to_string())),
                };
                (addr, kind)
            }
            None => (s, AddressKind::Public),
        };

        let mut addr = [0u8; 6];
        let mut parts = addr_part.split(':');
        for byte in addr.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ParseSenderIdError(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParseSenderIdError(s.to_string()));
            }
            *byte =
                u8::from_str_radix(part, 16).map_err(|_| ParseSenderIdError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseSenderIdError(s.to_string()));
        }

        Ok(Self { kind, addr })
    }
}

/// An accepted reading on its way through the ingestion queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPacket {
    /// Who broadcast the reading
    pub sender: SenderId,
    /// The decoded reading
    pub reading: SensorReading,
    /// Concentrator-local time (ms) at which the aggregator took the packet
    pub received_at: Option<u32>,
}

impl SensorPacket {
    /// Create a packet that has not been aggregated yet
    pub fn new(sender: SenderId, reading: SensorReading) -> Self {
        Self {
            sender,
            reading,
            received_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_len_by_discriminant() {
        assert_eq!(encoded_len(1), Some(10));
        assert_eq!(encoded_len(KIND_ERROR), None);
        assert_eq!(encoded_len(0xFF), None);
    }

    #[test]
    fn test_sensor_kind_roundtrip() {
        let kind = SensorKind::from_u8(SensorKind::Light as u8).unwrap();
        assert_eq!(kind, SensorKind::Light);
        assert_eq!(kind.body_len(), 2);
        assert_eq!(kind.to_string(), "light");
    }

    #[test]
    fn test_reading_kind() {
        let reading = SensorReading::light(12, 340);
        assert_eq!(reading.kind(), SensorKind::Light);
        assert_eq!(reading.encoded_len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_sender_display() {
        let sender = SenderId::random([0xC0, 0x01, 0x02, 0x03, 0x04, 0xFF]);
        assert_eq!(sender.to_string(), "C0:01:02:03:04:FF (random)");
    }

    #[test]
    fn test_sender_parse() {
        let sender: SenderId = "C0:01:02:03:04:FF (random)".parse().unwrap();
        assert_eq!(sender, SenderId::random([0xC0, 0x01, 0x02, 0x03, 0x04, 0xFF]));

        let bare: SenderId = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(bare.kind, AddressKind::Public);
        assert_eq!(bare.addr, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_sender_parse_rejects_garbage() {
        assert!("AA:BB:CC".parse::<SenderId>().is_err());
        assert!("AA:BB:CC:DD:EE:FF:00".parse::<SenderId>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<SenderId>().is_err());
        assert!("AA:BB:CC:DD:EE:FF (static)".parse::<SenderId>().is_err());
    }

    #[test]
    fn test_packet_starts_unstamped() {
        let packet = SensorPacket::new(SenderId::public([0; 6]), SensorReading::light(1, 10));
        assert!(packet.received_at.is_none());
    }
}
