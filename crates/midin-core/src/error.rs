//! Error types for the MIDI input core.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unsupported delta record version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid delta payload width: {0}")]
    InvalidWidth(u8),

    #[error("Truncated delta record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Delta offset {offset} (width {width}) is outside the device state block")]
    OffsetOutOfRange { offset: u32, width: u8 },
}

pub type Result<T> = std::result::Result<T, Error>;
