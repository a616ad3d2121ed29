//! Encoder module
//!
//! This module turns a [`SensorReading`] into the manufacturer-data bytes a
//! beacon advertises. The layout is fixed per kind, see [`crate::protocol`].

use crate::error::EncodeError;
use crate::protocol::{
    Measurement, SensorReading, COMPANY_ID, COMPANY_ID_OFFSET, HEADER_LEN, KIND_OFFSET,
    RESERVED_OFFSET, TIMESTAMP_OFFSET,
};

/// Encoder for beacon payloads
#[derive(Debug, Clone)]
pub struct Encoder {
    /// Company identifier written into every header
    company_id: u16,
}

impl Encoder {
    /// Create an encoder using the fleet's company identifier
    pub fn new() -> Self {
        Self::with_company_id(COMPANY_ID)
    }

    /// Create an encoder writing a specific company identifier
    pub fn with_company_id(company_id: u16) -> Self {
        Self { company_id }
    }

    /// Company identifier written by this encoder
    pub fn company_id(&self) -> u16 {
        self.company_id
    }

    /// Encode a reading into a freshly allocated buffer.
    ///
    /// Infallible: [`Measurement`] only has supported kinds, so an
    /// unsupported-type reading cannot be constructed in the first place.
    pub fn encode(&self, reading: &SensorReading) -> Vec<u8> {
        let mut buf = vec![0u8; reading.encoded_len()];
        self.write(reading, &mut buf);
        buf
    }

    /// Encode a reading into `buf`, returning the number of bytes written.
    ///
    /// Nothing is written when the buffer is too small.
    pub fn encode_into(
        &self,
        reading: &SensorReading,
        buf: &mut [u8],
    ) -> Result<usize, EncodeError> {
        let needed = reading.encoded_len();
        if buf.len() < needed {
            return Err(EncodeError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        self.write(reading, &mut buf[..needed]);
        Ok(needed)
    }

    /// Write header and body; `buf` is exactly `reading.encoded_len()` long
    fn write(&self, reading: &SensorReading, buf: &mut [u8]) {
        buf[COMPANY_ID_OFFSET..COMPANY_ID_OFFSET + 2]
            .copy_from_slice(&self.company_id.to_le_bytes());
        buf[KIND_OFFSET] = reading.kind() as u8;
        buf[RESERVED_OFFSET] = 0;
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 4]
            .copy_from_slice(&reading.timestamp.to_le_bytes());

        let body = &mut buf[HEADER_LEN..];
        match reading.measurement {
            Measurement::Light(value) => body[..2].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
