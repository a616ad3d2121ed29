//! Decoder module
//!
//! This module parses manufacturer-data bytes back into a [`SensorReading`].
//! The transport may hand over a frame longer than the reading; only the
//! length declared by the kind discriminant is ever read.

use crate::error::DecodeError;
use crate::protocol::{
    encoded_len, Measurement, SensorKind, SensorReading, COMPANY_ID_OFFSET, HEADER_LEN,
    KIND_OFFSET, TIMESTAMP_OFFSET,
};

/// Parsed fixed header of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Company identifier
    pub company_id: u16,
    /// Raw kind discriminant
    pub kind: u8,
    /// Sender-local timestamp, seconds
    pub timestamp: u32,
}

impl PayloadHeader {
    /// Parse the 8-byte header
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        Ok(Self {
            company_id: read_u16(bytes, COMPANY_ID_OFFSET),
            kind: bytes[KIND_OFFSET],
            timestamp: u32::from_le_bytes([
                bytes[TIMESTAMP_OFFSET],
                bytes[TIMESTAMP_OFFSET + 1],
                bytes[TIMESTAMP_OFFSET + 2],
                bytes[TIMESTAMP_OFFSET + 3],
            ]),
        })
    }
}

/// Read the company identifier without decoding the rest.
///
/// Used by receive paths to discard foreign broadcasts early.
pub fn peek_company_id(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < COMPANY_ID_OFFSET + 2 {
        return None;
    }
    Some(read_u16(bytes, COMPANY_ID_OFFSET))
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Decoder for beacon payloads
#[derive(Debug, Clone, Default)]
pub struct Decoder;

impl Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode a reading.
    ///
    /// Fails with [`DecodeError::UnsupportedType`] for an unknown kind and
    /// [`DecodeError::Truncated`] when the buffer is shorter than the kind
    /// declares. Bytes past the declared length are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<SensorReading, DecodeError> {
        if bytes.len() <= KIND_OFFSET {
            return Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let discriminant = bytes[KIND_OFFSET];
        let needed = encoded_len(discriminant).ok_or(DecodeError::UnsupportedType(discriminant))?;
        if bytes.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: bytes.len(),
            });
        }

        let payload = &bytes[..needed];
        let header = PayloadHeader::parse(payload)?;
        let body = &payload[HEADER_LEN..];

        let measurement = match SensorKind::from_u8(header.kind) {
            Some(SensorKind::Light) => Measurement::Light(read_u16(body, 0)),
            None => return Err(DecodeError::UnsupportedType(header.kind)),
        };

        Ok(SensorReading::new(header.timestamp, measurement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::protocol::COMPANY_ID;

    #[test]
    fn test_decode_light() {
        let bytes = [0x59, 0x00, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x14, 0x00];
        let reading = Decoder::new().decode(&bytes).unwrap();
        assert_eq!(reading, SensorReading::light(5, 20));
    }

    #[test]
    fn test_roundtrip() {
        let encoder = Encoder::new();
        let decoder = Decoder::new();
        for (ts, lux) in [(0, 0), (1, 10), (u32::MAX, u16::MAX), (3600, 512)] {
            let reading = SensorReading::light(ts, lux);
            assert_eq!(decoder.decode(&encoder.encode(&reading)).unwrap(), reading);
        }
    }

    #[test]
    fn test_decode_unsupported_type() {
        let mut bytes = Encoder::new().encode(&SensorReading::light(5, 20));
        bytes[KIND_OFFSET] = 0x07;
        assert_eq!(
            Decoder::new().decode(&bytes),
            Err(DecodeError::UnsupportedType(0x07))
        );

        bytes[KIND_OFFSET] = crate::protocol::KIND_ERROR;
        assert_eq!(
            Decoder::new().decode(&bytes),
            Err(DecodeError::UnsupportedType(0))
        );
    }

    #[test]
    fn test_decode_truncated_body() {
        let bytes = Encoder::new().encode(&SensorReading::light(5, 20));
        assert_eq!(
            Decoder::new().decode(&bytes[..9]),
            Err(DecodeError::Truncated {
                needed: 10,
                available: 9
            })
        );
    }

    #[test]
    fn test_decode_truncated_header() {
        assert_eq!(
            Decoder::new().decode(&[0x59, 0x00]),
            Err(DecodeError::Truncated {
                needed: HEADER_LEN,
                available: 2
            })
        );
        assert!(matches!(
            Decoder::new().decode(&[0x59, 0x00, 0x01, 0x00]),
            Err(DecodeError::Truncated { needed: 10, .. })
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = Encoder::new().encode(&SensorReading::light(9, 300));
        bytes.extend_from_slice(&[0xFF; 21]);
        assert_eq!(
            Decoder::new().decode(&bytes).unwrap(),
            SensorReading::light(9, 300)
        );
    }

    #[test]
    fn test_company_id_not_validated() {
        let bytes = Encoder::with_company_id(0x1234).encode(&SensorReading::light(1, 2));
        assert!(Decoder::new().decode(&bytes).is_ok());
        assert_eq!(peek_company_id(&bytes), Some(0x1234));
    }

    #[test]
    fn test_peek_company_id() {
        let bytes = Encoder::new().encode(&SensorReading::light(1, 2));
        assert_eq!(peek_company_id(&bytes), Some(COMPANY_ID));
        assert_eq!(peek_company_id(&[0x59]), None);
    }

    #[test]
    fn test_header_parse() {
        let bytes = Encoder::new().encode(&SensorReading::light(0xAABB, 2));
        let header = PayloadHeader::parse(&bytes).unwrap();
        assert_eq!(header.company_id, COMPANY_ID);
        assert_eq!(header.kind, 1);
        assert_eq!(header.timestamp, 0xAABB);
    }
}
