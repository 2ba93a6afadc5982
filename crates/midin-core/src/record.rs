//! Versioned binary state-delta records.
//!
//! A record addresses one device, one byte offset in its state block and
//! carries a 1, 2 or 4 byte little-endian payload. Records are the only thing
//! that crosses from port reader threads to the consumer.
//!
//! Wire layout (version 1), padded to [`RECORD_ALIGN`]:
//!
//! ```text
//! 0      1      2..4      4..8        8..12       12..12+width
//! ver    width  reserved  device u32  offset u32  payload
//! ```

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::error::{Error, Result};
use crate::layout;

pub const RECORD_VERSION: u8 = 1;
pub const RECORD_ALIGN: usize = 4;
const HEADER_LEN: usize = 12;

/// Identity of a logical device, as assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    Byte(u8),
    Word(u16),
    DWord(u32),
}

impl Payload {
    #[inline]
    pub fn width(&self) -> u8 {
        match self {
            Payload::Byte(_) => 1,
            Payload::Word(_) => 2,
            Payload::DWord(_) => 4,
        }
    }

    /// Little-endian bytes of the payload.
    #[inline]
    pub fn bytes(&self) -> PayloadBytes {
        let mut buf = [0u8; 4];
        match *self {
            Payload::Byte(value) => buf[0] = value,
            Payload::Word(value) => buf[..2].copy_from_slice(&value.to_le_bytes()),
            Payload::DWord(value) => buf.copy_from_slice(&value.to_le_bytes()),
        }
        PayloadBytes {
            buf,
            len: self.width(),
        }
    }

    fn from_le(width: u8, bytes: &[u8]) -> Result<Self> {
        match (width, bytes) {
            (1, [b0, ..]) => Ok(Payload::Byte(*b0)),
            (2, [b0, b1, ..]) => Ok(Payload::Word(u16::from_le_bytes([*b0, *b1]))),
            (4, [b0, b1, b2, b3, ..]) => Ok(Payload::DWord(u32::from_le_bytes([*b0, *b1, *b2, *b3]))),
            (1 | 2 | 4, _) => Err(Error::Truncated {
                needed: width as usize,
                available: bytes.len(),
            }),
            _ => Err(Error::InvalidWidth(width)),
        }
    }
}

/// Inline little-endian payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadBytes {
    buf: [u8; 4],
    len: u8,
}

impl Deref for PayloadBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }
}

/// One state change addressed to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDelta {
    pub device: DeviceId,
    pub offset: u32,
    pub payload: Payload,
}

impl StateDelta {
    /// Reject deltas that would write outside the device state block.
    pub fn validate(&self) -> Result<()> {
        let width = self.payload.width();
        if layout::fits(self.offset, width) {
            Ok(())
        } else {
            Err(Error::OffsetOutOfRange {
                offset: self.offset,
                width,
            })
        }
    }

    /// Encoded size including alignment padding.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        align_up(HEADER_LEN + self.payload.width() as usize, RECORD_ALIGN)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.push(RECORD_VERSION);
        out.push(self.payload.width());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.device.0.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.payload.bytes());
        out.resize(start + self.encoded_len(), 0);
    }

    /// Decode the record at the start of `bytes`, returning it and its encoded length.
    pub fn decode(bytes: &[u8]) -> Result<(StateDelta, usize)> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Truncated {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }
        if bytes[0] != RECORD_VERSION {
            return Err(Error::UnsupportedVersion(bytes[0]));
        }

        let width = bytes[1];
        let device = DeviceId(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
        let offset = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let payload = Payload::from_le(width, &bytes[HEADER_LEN..])?;

        let delta = StateDelta {
            device,
            offset,
            payload,
        };
        let len = delta.encoded_len().min(bytes.len());
        Ok((delta, len))
    }
}

#[inline]
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    match value % alignment {
        0 => value,
        remainder => value + alignment - remainder,
    }
}
