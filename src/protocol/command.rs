//! Command envelope
//!
//! Layout (header fields big-endian):
//! ┌──────────────┬───────────┬──────────────┬──────────────┬─────────────┐
//! │ reserved u32 │ device u16│ operation u16│ payload u32  │ payload ... │
//! └──────────────┴───────────┴──────────────┴──────────────┴─────────────┘
//!
//! The payload holds the packed scalar/array arguments that precede the
//! first vector argument. Vector data is never part of the envelope.

use crate::error::{Error, Result};

pub const HEADER_SIZE: usize = 12;

/// Largest payload a server session accepts in one envelope.
pub const MAX_PAYLOAD_SIZE: usize = 16384 * 8;

/// Fixed 12-byte envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub device_id: u16,
    pub operation_id: u16,
    pub payload_size: u32,
}

impl CommandHeader {
    #[inline(always)]
    pub fn new(device_id: u16, operation_id: u16, payload_size: u32) -> Self {
        Self {
            device_id,
            operation_id,
            payload_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        // bytes 0..4 stay zero (reserved)
        buf[4..6].copy_from_slice(&self.device_id.to_be_bytes());
        buf[6..8].copy_from_slice(&self.operation_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_be_bytes());
        buf
    }

    /// Parse and validate a received header.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let reserved = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if reserved != 0 {
            return Err(Error::ReservedField(reserved));
        }

        let header = Self {
            device_id: u16::from_be_bytes([buf[4], buf[5]]),
            operation_id: u16::from_be_bytes([buf[6], buf[7]]),
            payload_size: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        };

        if header.payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge(header.payload_size as usize));
        }

        Ok(header)
    }

    /// Total envelope size (header + payload)
    #[inline(always)]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload_size as usize
    }
}

/// A received command: header plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub header: CommandHeader,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn device_id(&self) -> u16 {
        self.header.device_id
    }

    pub fn operation_id(&self) -> u16 {
        self.header.operation_id
    }
}

/// Serialize a complete envelope.
pub fn encode_command(device_id: u16, operation_id: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge(payload.len()));
    }

    let header = CommandHeader::new(device_id, operation_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(header.total_size());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = CommandHeader::new(3, 1, 8);
        assert_eq!(
            header.to_bytes(),
            [0, 0, 0, 0, 0, 3, 0, 1, 0, 0, 0, 8]
        );
    }

    #[test]
    fn test_header_roundtrip() {
        let header = CommandHeader::new(0x0102, 0x0304, 42);
        let parsed = CommandHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.total_size(), HEADER_SIZE + 42);
    }

    #[test]
    fn test_reserved_must_be_zero() {
        let mut raw = CommandHeader::new(1, 1, 0).to_bytes();
        raw[3] = 1;
        assert!(matches!(
            CommandHeader::from_bytes(&raw),
            Err(Error::ReservedField(1))
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let raw = CommandHeader::new(2, 0, (MAX_PAYLOAD_SIZE + 1) as u32).to_bytes();
        assert!(matches!(
            CommandHeader::from_bytes(&raw),
            Err(Error::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_command() {
        let bytes = encode_command(2, 0, &[0, 0, 0, 1, 0, 0, 0, 1]).unwrap();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 8]);
        assert_eq!(&bytes[12..], &[0, 0, 0, 1, 0, 0, 0, 1]);
    }
}
